//! Upload controller: owns the picked image, its preview and the inline
//! validation message.

use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use tracing::{debug, info};

use crate::error::ValidationError;

/// Largest accepted upload, 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

/// A file as handed over by the browser or read from disk.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    /// Content type declared by the sender, if any.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime,
            bytes,
        }
    }

    /// Reads a local file, deriving the declared type from its extension.
    pub async fn from_path(path: &Path) -> Result<Self, ValidationError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| ValidationError::Unreadable)?;
        let mime = ImageFormat::from_path(path)
            .ok()
            .map(|format| format_mime(format).to_string());
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(Self::new(file_name, mime, bytes))
    }

    /// Declared content type, normalized. Generic or missing types fall back
    /// to sniffing the leading bytes.
    fn effective_mime(&self) -> String {
        let declared = self
            .mime
            .as_deref()
            .map(|raw| raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|mime| !mime.is_empty() && mime != "application/octet-stream");

        match declared {
            Some(mime) => mime,
            None => image::guess_format(&self.bytes)
                .map(|format| format_mime(format).to_string())
                .unwrap_or_else(|_| "application/octet-stream".to_string()),
        }
    }
}

fn format_mime(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Checks type and size. Type is checked first.
pub fn validate(file: &ImageFile) -> Result<String, ValidationError> {
    let mime = file.effective_mime();
    if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::UnsupportedType { mime });
    }

    let size = file.bytes.len() as u64;
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge { size });
    }

    Ok(mime)
}

/// A validated image together with its displayable preview.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    /// `data:` URL the page can drop straight into an `<img>`.
    pub preview: String,
}

impl SelectedImage {
    fn build(file: ImageFile, mime: String) -> Self {
        let preview = format!(
            "data:{};base64,{}",
            mime,
            general_purpose::STANDARD.encode(&file.bytes)
        );

        Self {
            file_name: file.file_name,
            mime,
            bytes: file.bytes,
            preview,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Default)]
pub struct UploadController {
    selected: Option<SelectedImage>,
    error: Option<String>,
}

impl UploadController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores `file`. On rejection the previous selection is
    /// kept and the message is exposed through [`UploadController::error`].
    pub fn select_file(&mut self, file: ImageFile) -> Result<&SelectedImage, ValidationError> {
        let mime = match validate(&file) {
            Ok(mime) => mime,
            Err(err) => {
                debug!(file = %file.file_name, error = %err, "rejected upload");
                self.error = Some(err.to_string());
                return Err(err);
            }
        };

        // Drop the old preview before encoding the new one.
        self.selected = None;
        self.error = None;

        let selected = SelectedImage::build(file, mime);
        info!(
            file = %selected.file_name,
            mime = %selected.mime,
            bytes = selected.size(),
            "image selected"
        );
        Ok(self.selected.insert(selected))
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.error = None;
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Surfaces a rejection that happened before a file could be built,
    /// e.g. a multipart body over the hard limit.
    pub fn reject(&mut self, err: &ValidationError) {
        self.error = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn file(mime: &str, len: usize) -> ImageFile {
        ImageFile::new("leaf.png", Some(mime.to_string()), vec![0u8; len])
    }

    #[test]
    fn accepts_the_three_image_types() {
        for mime in ACCEPTED_MIME_TYPES {
            let mut upload = UploadController::new();
            assert!(upload.select_file(file(mime, 16)).is_ok(), "{mime}");
            assert!(upload.error().is_none());
        }
    }

    #[test]
    fn rejects_other_types_with_message() {
        for mime in ["image/gif", "image/webp", "application/pdf", "text/plain"] {
            let mut upload = UploadController::new();
            let err = upload.select_file(file(mime, 16)).unwrap_err();
            assert!(matches!(err, ValidationError::UnsupportedType { .. }));
            assert!(upload.selected().is_none());
            assert!(upload.error().unwrap().contains("JPG or PNG"));
        }
    }

    #[test]
    fn size_limit_is_inclusive() {
        let mut upload = UploadController::new();
        assert!(upload
            .select_file(file("image/jpeg", MAX_UPLOAD_BYTES as usize))
            .is_ok());

        let err = upload
            .select_file(file("image/jpeg", MAX_UPLOAD_BYTES as usize + 1))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: MAX_UPLOAD_BYTES + 1
            }
        );
        // The earlier valid selection survives a rejected one.
        assert!(upload.selected().is_some());
    }

    #[test]
    fn new_selection_replaces_preview_and_clears_error() {
        let mut upload = UploadController::new();
        let _ = upload.select_file(file("text/plain", 4));
        assert!(upload.error().is_some());

        upload.select_file(file("image/png", 3)).unwrap();
        assert_eq!(upload.selected().unwrap().preview, "data:image/png;base64,AAAA");
        assert!(upload.error().is_none());

        upload
            .select_file(ImageFile::new("b.jpg", Some("image/jpeg".into()), vec![1, 2, 3]))
            .unwrap();
        let selected = upload.selected().unwrap();
        assert_eq!(selected.file_name, "b.jpg");
        assert!(selected.preview.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn undeclared_type_is_sniffed() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let mut upload = UploadController::new();

        let selected = upload
            .select_file(ImageFile::new("leaf", None, bytes))
            .unwrap();
        assert_eq!(selected.mime, "image/png");

        let err = upload
            .select_file(ImageFile::new(
                "notes",
                Some("application/octet-stream".into()),
                b"hello".to_vec(),
            ))
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn declared_type_parameters_are_ignored() {
        let mut upload = UploadController::new();
        assert!(upload.select_file(file("Image/PNG; charset=binary", 4)).is_ok());
    }

    #[test]
    fn clear_discards_everything() {
        let mut upload = UploadController::new();
        upload.select_file(file("image/png", 4)).unwrap();
        upload.reject(&ValidationError::Unreadable);
        upload.clear();
        assert!(upload.selected().is_none());
        assert!(upload.error().is_none());
    }
}
