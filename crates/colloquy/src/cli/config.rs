use std::path::PathBuf;

use eyre::Result;

/// Loads `.env` from the working directory or its parents. A missing file is
/// not an error; a malformed one is.
pub fn load_env() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}
