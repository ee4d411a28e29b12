//! File upload validation.
//!
//! Checks run in a fixed order: size, then extension, then declared MIME
//! type. Size is judged first so an oversized file is reported as such
//! whatever else is wrong with it.

use std::collections::HashSet;

use crate::config::UploadConfig;

/// Why an upload was refused. The `Display` text is returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("File too large. Maximum size is {max_mb}MB")]
    TooLarge { max_mb: u64 },
    #[error("File type not allowed: .{0}")]
    DangerousExtension(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedMimeType(String),
    #[error("Malformed upload: {0}")]
    Malformed(String),
}

impl UploadError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            UploadError::TooLarge { .. } => "too_large",
            UploadError::DangerousExtension(_) => "dangerous_extension",
            UploadError::UnsupportedMimeType(_) => "mime_type",
            UploadError::Malformed(_) => "malformed",
        }
    }
}

/// Upload acceptance rules.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_bytes: u64,
    allowed_mime_types: HashSet<String>,
    dangerous_extensions: HashSet<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            dangerous_extensions: config
                .dangerous_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    pub fn check_size(&self, size: u64) -> Result<(), UploadError> {
        if size > self.max_file_bytes {
            return Err(UploadError::TooLarge {
                max_mb: self.max_file_bytes / (1024 * 1024),
            });
        }
        Ok(())
    }

    /// Validate a complete upload.
    pub fn validate(&self, file_name: &str, mime_type: &str, size: u64) -> Result<(), UploadError> {
        self.check_size(size)?;
        self.check_name_and_type(file_name, mime_type)
    }

    /// The size-independent part of [`UploadPolicy::validate`], usable before
    /// the body has been read.
    pub fn check_name_and_type(&self, file_name: &str, mime_type: &str) -> Result<(), UploadError> {
        // Every dotted suffix counts, so `photo.exe.png` is refused too.
        let lower = file_name.to_ascii_lowercase();
        if let Some(ext) = lower
            .split('.')
            .skip(1)
            .find(|ext| self.dangerous_extensions.contains(*ext))
        {
            return Err(UploadError::DangerousExtension(ext.to_string()));
        }

        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !self.allowed_mime_types.contains(&essence) {
            return Err(UploadError::UnsupportedMimeType(essence));
        }
        Ok(())
    }
}
