use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unable to write {0}: {1}")]
    WriteError(String, String),
}

/// Writes a rendered template into the output directory, creating it if needed.
pub fn write(output_dir: &Path, file_name: &str, contents: &str) -> Result<PathBuf, Error> {
    let path = output_dir.join(file_name);
    let write_error = |error: std::io::Error| Error::WriteError(path.display().to_string(), error.to_string());

    fs::create_dir_all(output_dir).map_err(write_error)?;
    fs::write(&path, contents).map_err(write_error)?;
    tracing::debug!(path = %path.display(), "template written");

    return Ok(path);
}
