use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use color_eyre::{Result, eyre::WrapErr as _};
use log::debug;
use tokio::task::JoinSet;

use crate::gemini_api::{GenerationError, InlineImage};

/// A reference image as handed over by the file picker: raw bytes and the
/// declared mime type.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, GenerationError> {
        let name = name.into();
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(GenerationError::InvalidAttachment { name });
        }
        Ok(Self {
            name,
            mime_type,
            bytes: bytes.into(),
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_for_path(path).ok_or(GenerationError::InvalidAttachment {
            name: name.clone(),
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        debug!("read {} ({mime_type}, {} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, mime_type, bytes)?)
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// Base64-encodes every attachment on the blocking pool and waits for all of
/// them. Results are placed by source index, so completion order doesn't
/// matter.
pub async fn encode_all(attachments: &[Attachment]) -> Result<Vec<InlineImage>, GenerationError> {
    let mut tasks = JoinSet::new();
    for (idx, attachment) in attachments.iter().enumerate() {
        let bytes = attachment.bytes.clone();
        let mime_type = attachment.mime_type.clone();
        tasks.spawn_blocking(move || {
            (
                idx,
                InlineImage {
                    mime_type,
                    data: BASE64.encode(&bytes),
                },
            )
        });
    }

    let mut slots: Vec<Option<InlineImage>> = vec![None; attachments.len()];
    while let Some(joined) = tasks.join_next().await {
        let (idx, image) = joined.map_err(|e| GenerationError::Encoding(e.to_string()))?;
        slots[idx] = Some(image);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| GenerationError::Encoding(format!("no result for image {idx}")))
        })
        .collect()
}
