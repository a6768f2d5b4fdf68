use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::analysis::error::AttachmentError;

/// One encoded document, immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    // base64, standard alphabet
    pub content: String,
}

impl FileAttachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self { name: name.into(), mime_type: mime_type.into(), content: STANDARD.encode(bytes) }
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub async fn encode_file(path: &Path) -> Result<FileAttachment, AttachmentError> {
    let name = display_name(path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError { name: name.clone(), source })?;
    log::debug!("encoded {} ({} bytes)", name, bytes.len());
    Ok(FileAttachment::from_bytes(name, mime_for_path(path), &bytes))
}

/// Reads every file concurrently. The result keeps the input order no matter
/// which read finishes first; the first failure aborts the whole set.
pub async fn encode_all(paths: &[PathBuf]) -> Result<Vec<FileAttachment>, AttachmentError> {
    try_join_all(paths.iter().map(|p| encode_file(p))).await
}

/// Header text for the loaded set: the file name, or a count for several.
pub fn describe(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(one.clone()),
        many => Some(format!("{} Papers Loaded", many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_for_path(Path::new("paper.PDF")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("fig.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn describe_single_and_many() {
        assert_eq!(describe(&[]), None);
        assert_eq!(describe(&["a.pdf".into()]).as_deref(), Some("a.pdf"));
        assert_eq!(describe(&["a.pdf".into(), "b.pdf".into()]).as_deref(), Some("2 Papers Loaded"));
    }

    #[test]
    fn bytes_are_base64_encoded() {
        let a = FileAttachment::from_bytes("x.txt", "text/plain", b"ABC");
        assert_eq!(a.content, "QUJD");
    }
}
