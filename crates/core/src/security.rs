//! Limits applied to downloaded archives before anything is decompressed.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLimits {
    /// Maximum number of entries in the ZIP container.
    pub max_file_count: u64,
    /// Maximum decompressed size of a single entry in bytes.
    pub max_entry_size_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_file_count: 10_000,
            max_entry_size_bytes: 200 * 1024 * 1024,
        }
    }
}

impl ArchiveLimits {
    pub fn check_file_count(&self, count: u64) -> Result<(), SecurityError> {
        if count > self.max_file_count {
            return Err(SecurityError::TooManyFiles {
                count,
                limit: self.max_file_count,
            });
        }
        Ok(())
    }

    pub fn check_entry_size(&self, name: &str, size_bytes: u64) -> Result<(), SecurityError> {
        if size_bytes > self.max_entry_size_bytes {
            return Err(SecurityError::OversizedEntry {
                name: name.to_string(),
                size_mb: size_bytes / (1024 * 1024),
                limit_mb: self.max_entry_size_bytes / (1024 * 1024),
            });
        }
        Ok(())
    }
}

/// Reject entry paths that are absolute or climb out of the archive root.
pub fn check_entry_path(entry_path: &str) -> Result<(), SecurityError> {
    let traversal = || SecurityError::PathTraversal {
        path: entry_path.to_string(),
    };

    if entry_path.starts_with('/') || entry_path.starts_with('\\') {
        return Err(traversal());
    }
    // C:\ style
    if entry_path.len() >= 2 && entry_path.as_bytes()[1] == b':' {
        return Err(traversal());
    }
    if Path::new(entry_path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(traversal());
    }
    Ok(())
}

/// Inspect `META-INF/encryption.xml`. Font obfuscation is not DRM and passes.
pub fn check_drm(encryption_xml: &str) -> Result<(), SecurityError> {
    if let Some(scheme) = detect_drm(encryption_xml) {
        return Err(SecurityError::DrmProtected(scheme));
    }
    Ok(())
}

fn detect_drm(xml: &str) -> Option<&'static str> {
    const SCHEMES: &[(&str, &str)] = &[
        ("http://ns.adobe.com/adept", "Adobe DRM"),
        ("http://ns.adobe.com/digitaleditions", "Adobe DRM"),
        ("http://www.apple.com/ibooks", "Apple FairPlay"),
        ("sinf", "Apple FairPlay"),
        ("http://urms.org", "Sony URMS"),
    ];
    if let Some((_, name)) = SCHEMES.iter().find(|(marker, _)| xml.contains(marker)) {
        return Some(name);
    }

    let font_obfuscation = xml.contains("http://www.idpf.org/2008/embedding")
        || xml.contains("http://ns.adobe.com/pdf/enc#RC");
    if xml.contains("EncryptedData") && !font_obfuscation {
        return Some("Unknown DRM");
    }
    None
}
