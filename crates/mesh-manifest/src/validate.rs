//! Field validation for rendered manifests.

use regex_lite::Regex;
use std::sync::OnceLock;

use crate::error::ManifestError;

/// Maximum length of a DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid name pattern"))
}

fn memory_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$")
            .expect("valid memory pattern")
    })
}

/// Check that `name` is a DNS-1123 label (lowercase alphanumerics and '-').
pub fn validate_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ManifestError::InvalidName {
            name: name.to_string(),
            reason: format!("must be at most {} characters", MAX_NAME_LEN),
        });
    }
    if !name_re().is_match(name) {
        return Err(ManifestError::InvalidName {
            name: name.to_string(),
            reason: "must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric"
                .to_string(),
        });
    }
    Ok(())
}

/// Check that `memory` is a Kubernetes quantity such as `500Mi` or `1Gi`.
pub fn validate_memory(memory: &str) -> Result<(), ManifestError> {
    if memory_re().is_match(memory) {
        Ok(())
    } else {
        Err(ManifestError::InvalidMemory(memory.to_string()))
    }
}
