use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Local};
use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use log::info;
use uuid::Uuid;

use crate::gemini_api::InlineImage;

/// One generated image. Never changes after creation.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    id: Uuid,
    data_uri: String,
    prompt: String,
    created_at: DateTime<Local>,
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type())
            .field("prompt", &self.prompt)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl GeneratedImage {
    pub fn new(image: &InlineImage, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data_uri: data_uri(&image.mime_type, &image.data),
            prompt: prompt.into(),
            created_at: Local::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn mime_type(&self) -> &str {
        split_data_uri(&self.data_uri)
            .map(|(mime, _)| mime)
            .unwrap_or("application/octet-stream")
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        let (_, data) =
            split_data_uri(&self.data_uri).ok_or_else(|| eyre!("Not a base64 data URI"))?;
        Ok(BASE64.decode(data)?)
    }

    /// Writes the image to `dir` as `nanogen-{millis}-{index}.{ext}` and
    /// returns the path.
    pub fn save_to(&self, dir: &Path, index: usize) -> Result<PathBuf> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = dir.join(format!(
            "nanogen-{millis}-{index}.{}",
            extension_for_mime(self.mime_type())
        ));

        std::fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
        std::fs::write(&path, self.decode()?)
            .wrap_err_with(|| format!("writing {}", path.display()))?;
        info!("Saved image to {}", path.display());
        Ok(path)
    }
}

pub fn data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    Some((mime, data))
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(mime: &str, data: &str) -> InlineImage {
        InlineImage {
            mime_type: mime.into(),
            data: data.into(),
        }
    }

    #[test]
    fn builds_data_uri() {
        let img = GeneratedImage::new(&inline("image/png", "aGVsbG8="), "a fox");
        assert_eq!(img.data_uri(), "data:image/png;base64,aGVsbG8=");
        assert_eq!(img.mime_type(), "image/png");
        assert_eq!(img.prompt(), "a fox");
        assert_eq!(img.decode().unwrap(), b"hello");
    }

    #[test]
    fn ids_are_unique() {
        let a = GeneratedImage::new(&inline("image/png", "AA=="), "x");
        let b = GeneratedImage::new(&inline("image/png", "AA=="), "x");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn saves_with_matching_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let png = GeneratedImage::new(&inline("image/png", "aGVsbG8="), "x");
        let path = png.save_to(&out, 0).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("nanogen-")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        let other = GeneratedImage::new(&inline("image/heic", "aGVsbG8="), "x");
        assert_eq!(other.save_to(&out, 1).unwrap().extension().unwrap(), "jpg");
    }

    #[test]
    fn bad_payload_does_not_save() {
        let dir = tempfile::tempdir().unwrap();
        let img = GeneratedImage::new(&inline("image/png", "!!not base64!!"), "x");
        assert!(img.save_to(dir.path(), 0).is_err());
    }
}
