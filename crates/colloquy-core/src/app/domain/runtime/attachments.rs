//! Uploads binary attachments before the user message that carries them is
//! appended.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::domain::event::Attachment;
use crate::app::domain::types::{ConversationId, DeviceId};

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Upload failed: {message}")]
    Upload { message: String },
}

impl AttachmentError {
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
        }
    }
}

/// Binary content picked by the user that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAttachment {
    pub data_url: String,
}

impl PendingAttachment {
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
        }
    }

    /// Media type declared by a `data:` URL, if any.
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.data_url.strip_prefix("data:")?;
        let header = rest.split_once(',').map_or(rest, |(header, _)| header);
        let mime = header.split(';').next()?;
        (!mime.is_empty()).then_some(mime)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachment {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub data_url: String,
}

#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    /// Stores one attachment. `Ok(None)` means the backend accepted the call
    /// but produced nothing to reference.
    async fn create_attachment(
        &self,
        request: CreateAttachment,
    ) -> Result<Option<Attachment>, AttachmentError>;
}

/// Uploads every pending attachment concurrently.
///
/// Failed or empty uploads are logged and omitted; the rest come back in
/// input order.
pub async fn upload_pending(
    uploader: &dyn AttachmentUploader,
    conversation_id: &ConversationId,
    device_id: Option<&DeviceId>,
    pending: &[PendingAttachment],
) -> Vec<Attachment> {
    if pending.is_empty() {
        return Vec::new();
    }

    let uploads = pending.iter().map(|attachment| {
        uploader.create_attachment(CreateAttachment {
            conversation_id: conversation_id.clone(),
            device_id: device_id.cloned(),
            data_url: attachment.data_url.clone(),
        })
    });

    let results = join_all(uploads).await;

    let mut uploaded = Vec::with_capacity(results.len());
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Some(attachment)) => uploaded.push(attachment),
            Ok(None) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    index,
                    "Attachment upload returned nothing, omitting"
                );
            }
            Err(err) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    index,
                    mime_type = pending[index].mime_type().unwrap_or("unknown"),
                    error = %err,
                    "Attachment upload failed, omitting"
                );
            }
        }
    }

    tracing::debug!(
        conversation_id = %conversation_id,
        requested = pending.len(),
        uploaded = uploaded.len(),
        "Attachment batch finished"
    );
    uploaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::types::AttachmentId;
    use rstest::rstest;
    use std::time::Duration;

    /// Fails any data URL containing "bad"; sleeps longer for earlier items so
    /// completion order is the reverse of input order.
    struct SlowUploader;

    #[async_trait]
    impl AttachmentUploader for SlowUploader {
        async fn create_attachment(
            &self,
            request: CreateAttachment,
        ) -> Result<Option<Attachment>, AttachmentError> {
            let delay = 10u64.saturating_sub(request.data_url.len() as u64 % 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if request.data_url.contains("bad") {
                return Err(AttachmentError::upload("backend said no"));
            }
            if request.data_url.contains("empty") {
                return Ok(None);
            }
            Ok(Some(Attachment {
                id: AttachmentId::from(request.data_url.clone()),
                url: None,
                mime_type: None,
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_input_order_and_drops_failures() {
        let pending = vec![
            PendingAttachment::new("data:image/png;base64,a"),
            PendingAttachment::new("data:image/png;base64,bad"),
            PendingAttachment::new("data:image/png;base64,empty"),
            PendingAttachment::new("data:image/jpeg;base64,cccc"),
        ];

        let uploaded = upload_pending(&SlowUploader, &ConversationId::from("c1"), None, &pending).await;

        let ids: Vec<&str> = uploaded.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["data:image/png;base64,a", "data:image/jpeg;base64,cccc"]);
    }

    #[tokio::test]
    async fn all_failures_yield_empty_list() {
        let pending = vec![PendingAttachment::new("bad1"), PendingAttachment::new("bad2")];
        let uploaded = upload_pending(&SlowUploader, &ConversationId::from("c1"), None, &pending).await;
        assert!(uploaded.is_empty());
    }

    #[rstest]
    #[case("data:image/png;base64,AAAA", Some("image/png"))]
    #[case("data:text/plain,hello", Some("text/plain"))]
    #[case("data:;base64,AAAA", None)]
    #[case("https://example.com/a.png", None)]
    fn reads_mime_type_from_data_url(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(PendingAttachment::new(url).mime_type(), expected);
    }
}
