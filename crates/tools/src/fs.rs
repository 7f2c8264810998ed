use std::path::{Path, PathBuf};
use tracing::debug;
use webrover_core::{Error, Result};

/// Resolve `~/` against the home directory and relative paths against `workspace`.
pub fn expand_path(path: &str, workspace: &Path) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        workspace.join(path)
    }
}

/// Text of a local file, cut at `max_bytes` on a char boundary.
///
/// Missing files are `Error::NotFound`; directories and unreadable files
/// are `Error::PermissionDenied`.
pub async fn read_text_file(path: &str, workspace: &Path, max_bytes: usize) -> Result<String> {
    let path = expand_path(path, workspace);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }
        Err(e) => {
            return Err(Error::PermissionDenied(format!("{}: {}", path.display(), e)));
        }
    };

    if !metadata.is_file() {
        return Err(Error::PermissionDenied(format!("Not a file: {}", path.display())));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("File not found: {}", path.display())),
        _ => Error::PermissionDenied(format!("{}: {}", path.display(), e)),
    })?;

    let text = String::from_utf8_lossy(&bytes);
    let content = crate::safe_truncate(&text, max_bytes).to_string();
    debug!(path = %path.display(), bytes = bytes.len(), returned = content.len(), "File read");
    Ok(content)
}
