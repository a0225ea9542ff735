use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// A reference to the file's bytes that is cheap to pass around. Exactly one
/// of `storage_path`, `original_url`, or `inline` must be present -- enforced
/// by [`FileContext::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FileLocator {
    /// Local path readable by any component that needs the bytes.
    StoragePath(String),
    /// Source URL the file was referenced from (not necessarily downloaded).
    OriginalUrl(String),
    /// A small buffer embedded directly in the request (tiny files only).
    Inline(Vec<u8>),
}

/// The invariant input of a job: everything the pipeline needs to know about
/// the file itself, independent of who is asking or why.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileContext {
    /// Already sanitized against path traversal by the caller.
    pub filename: String,
    /// Authoritative MIME type derived from magic-byte inspection. The
    /// client-declared type, if any, is carried separately as advisory.
    pub mime_type: String,
    pub client_declared_mime_type: Option<String>,
    pub file_size: u64,
    pub file_hash: Option<String>,
    pub locator: FileLocator,
}

impl FileContext {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        file_size: u64,
        locator: FileLocator,
    ) -> Result<Self> {
        let filename = filename.into();
        if filename.is_empty() {
            return Err(ModelError::InvalidFileContext(
                "filename must not be empty".into(),
            ));
        }
        if filename.contains("..") || filename.contains('\0') {
            return Err(ModelError::InvalidFileContext(
                "filename must already be sanitized against path traversal".into(),
            ));
        }
        Ok(Self {
            filename,
            mime_type: mime_type.into(),
            client_declared_mime_type: None,
            file_size,
            file_hash: None,
            locator,
        })
    }

    pub fn storage_path(&self) -> Option<&str> {
        match &self.locator {
            FileLocator::StoragePath(path) => Some(path),
            _ => None,
        }
    }

    pub fn original_url(&self) -> Option<&str> {
        match &self.locator {
            FileLocator::OriginalUrl(url) => Some(url),
            _ => None,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// Identity and trust signal attached to a request. Absence of any field
/// means "anonymous, no trust signal" -- it never blocks processing on its
/// own.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserContext {
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    /// Trust score in [0, 1]; `None` means no signal is available.
    pub user_trust_score: Option<f32>,
}

impl UserContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn trust_score(&self) -> f32 {
        self.user_trust_score.unwrap_or(0.5).clamp(0.0, 1.0)
    }
}

/// Opaque bag of policy flags consumed only by the decision engine.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrgSecurityPolicy {
    pub flags: HashMap<String, String>,
}

impl OrgSecurityPolicy {
    pub fn flag(&self, key: &str) -> Option<&str> {
        self.flags.get(key).map(String::as_str)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.flags
            .get(key)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_filename() {
        let err = FileContext::new(
            "",
            "application/pdf",
            10,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidFileContext(_)));
    }

    #[test]
    fn rejects_path_traversal() {
        let err = FileContext::new(
            "../../etc/passwd",
            "text/plain",
            10,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidFileContext(_)));
    }

    #[test]
    fn extension_is_derived_from_filename() {
        let ctx = FileContext::new(
            "report.pdf",
            "application/pdf",
            10,
            FileLocator::StoragePath("/tmp/x".into()),
        )
        .unwrap();
        assert_eq!(ctx.extension(), Some("pdf"));
    }

    #[test]
    fn anonymous_user_has_neutral_trust() {
        let user = UserContext::anonymous();
        assert_eq!(user.trust_score(), 0.5);
    }
}
