//! Image selection and data URI encoding.

use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use thiserror::Error;

/// Largest image accepted for upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Invalid file type: {}", .mime_type.as_deref().unwrap_or("unknown"))]
    InvalidFileType { mime_type: Option<String> },
    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: usize, max: usize },
    #[error("File is empty")]
    EmptyFile,
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum DataUriError {
    #[error("not a data URI")]
    MissingScheme,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// A file handed over by the user, before validation.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    /// Reads a file from disk, declaring its MIME type from the extension
    /// or, failing that, from the content signature.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AcquisitionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mime_type = ImageFormat::from_path(path)
            .ok()
            .or_else(|| image::guess_format(&bytes).ok())
            .and_then(mime_for_format)
            .map(str::to_string);

        Ok(Self::new(name, mime_type, bytes))
    }
}

/// An accepted image together with its encoded preview.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub preview: String,
}

impl UploadedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Validates a user-provided file and encodes its preview.
pub fn select(file: ImageFile) -> Result<UploadedImage, AcquisitionError> {
    let mime_type = match file.mime_type {
        Some(mime) if mime.starts_with("image/") => mime,
        other => return Err(AcquisitionError::InvalidFileType { mime_type: other }),
    };
    if file.bytes.is_empty() {
        return Err(AcquisitionError::EmptyFile);
    }
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AcquisitionError::FileTooLarge {
            size: file.bytes.len(),
            max: MAX_UPLOAD_BYTES,
        });
    }

    let preview = DataUri::encode(&mime_type, &file.bytes);
    tracing::debug!(
        "Selected {} ({}, {} bytes)",
        file.name,
        mime_type,
        file.bytes.len()
    );

    Ok(UploadedImage {
        name: file.name,
        mime_type,
        bytes: file.bytes,
        preview,
    })
}

/// A decoded `data:<mime>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            mime_type,
            general_purpose::STANDARD.encode(bytes)
        )
    }

    pub fn parse(uri: &str) -> Result<Self, DataUriError> {
        let rest = uri.strip_prefix("data:").ok_or(DataUriError::MissingScheme)?;
        let (meta, payload) = rest.split_once(',').ok_or(DataUriError::MissingScheme)?;
        let mime_type = meta
            .strip_suffix(";base64")
            .ok_or(DataUriError::NotBase64)?
            .to_string();
        let bytes = general_purpose::STANDARD.decode(payload.trim())?;
        Ok(Self { mime_type, bytes })
    }
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Ico => Some("image/x-icon"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}
