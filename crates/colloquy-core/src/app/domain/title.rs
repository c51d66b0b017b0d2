//! Human-readable labels for tool invocations.
//!
//! Titles are display-only. Nothing in step status or correlation reads them.

use serde_json::Value;
use url::Url;

pub const DEFAULT_COMMAND_TITLE_MAX_CHARS: usize = 48;

#[derive(Debug, Clone, Copy)]
pub struct TitleOptions {
    pub command_max_chars: usize,
}

impl Default for TitleOptions {
    fn default() -> Self {
        Self {
            command_max_chars: DEFAULT_COMMAND_TITLE_MAX_CHARS,
        }
    }
}

/// Builds a title such as `Read main.rs`, `Run cargo test` or
/// `Fetch docs.rs` from a tool name and its declared arguments.
pub fn tool_title(tool: &str, args: &Value, options: TitleOptions) -> String {
    let verb = tool_verb(tool);
    match describe_args(args, options) {
        Some(detail) => format!("{verb} {detail}"),
        None => verb,
    }
}

fn tool_verb(tool: &str) -> String {
    let verb = match tool.to_ascii_lowercase().as_str() {
        "read" | "read_file" | "view" | "cat" => "Read",
        "write" | "write_file" | "create_file" => "Write",
        "edit" | "edit_file" | "replace" | "multi_edit" => "Edit",
        "bash" | "shell" | "run_shell" | "exec" | "command" => "Run",
        "fetch" | "web_fetch" | "browse" | "open_url" => "Fetch",
        "grep" | "search" | "web_search" => "Search",
        "glob" | "ls" | "list_files" | "find" => "List",
        _ => return humanize(tool),
    };
    verb.to_string()
}

fn humanize(tool: &str) -> String {
    let spaced = tool.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Tool".to_string(),
    }
}

fn describe_args(args: &Value, options: TitleOptions) -> Option<String> {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| args.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(path) = field(&["path", "file_path", "filePath", "file"]) {
        return Some(basename(path).to_string());
    }
    if let Some(command) = field(&["command", "cmd"]) {
        return Some(truncate(command, options.command_max_chars));
    }
    if let Some(raw) = field(&["url", "href"]) {
        return Some(hostname(raw).unwrap_or_else(|| truncate(raw, options.command_max_chars)));
    }
    if let Some(pattern) = field(&["pattern", "query", "glob"]) {
        return Some(format!("\"{}\"", truncate(pattern, options.command_max_chars)));
    }
    None
}

fn basename(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(path)
}

fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

fn truncate(value: &str, max_chars: usize) -> String {
    let first_line = value.lines().next().unwrap_or_default().trim_end();
    if first_line.chars().count() <= max_chars && first_line.len() == value.trim_end().len() {
        return first_line.to_string();
    }
    let kept: String = first_line.chars().take(max_chars).collect();
    format!("{}…", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("read", json!({"path": "/repo/src/main.rs"}), "Read main.rs")]
    #[case("write_file", json!({"file_path": "C:\\work\\notes.txt"}), "Write notes.txt")]
    #[case("bash", json!({"command": "cargo test"}), "Run cargo test")]
    #[case("bash", json!({"command": "cargo test\n"}), "Run cargo test")]
    #[case("fetch", json!({"url": "https://docs.rs/tokio/latest"}), "Fetch docs.rs")]
    #[case("grep", json!({"pattern": "TODO"}), "Search \"TODO\"")]
    #[case("screenshot_region", json!({}), "Screenshot region")]
    fn derives_titles_from_arguments(
        #[case] tool: &str,
        #[case] args: Value,
        #[case] expected: &str,
    ) {
        assert_eq!(tool_title(tool, &args, TitleOptions::default()), expected);
    }

    #[test]
    fn long_commands_are_truncated() {
        let args = json!({"command": "echo aaaaaaaaaaaaaaaaaaaa && echo bbbbbbbbbbbbbbbbbbbb"});
        let title = tool_title("bash", &args, TitleOptions { command_max_chars: 10 });
        assert_eq!(title, "Run echo aaaaa…");
    }

    #[test]
    fn multiline_commands_keep_first_line() {
        let args = json!({"command": "set -e\nmake"});
        assert_eq!(
            tool_title("bash", &args, TitleOptions::default()),
            "Run set -e…"
        );
    }

    #[test]
    fn unparsable_urls_fall_back_to_text() {
        let args = json!({"url": "not a url"});
        assert_eq!(
            tool_title("fetch", &args, TitleOptions::default()),
            "Fetch not a url"
        );
    }
}
