//! Format validators shared by the Session and Memory engines. Validation
//! happens once at the boundary and returns a `CoreError::ValidationError`
//! rather than letting malformed data reach storage.

use std::sync::OnceLock;

use crate::error::CoreError;

fn session_id_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^session_[0-9a-f]{16}$").expect("static regex"))
}

fn memory_key_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("static regex"))
}

#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    session_id_regex().is_match(id)
}

/// Generate a new session id: `session_` followed by 16 lowercase hex digits
/// drawn from a cryptographic RNG.
#[must_use]
pub fn generate_session_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("session_{}", hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn validate_purpose(purpose: &str) -> Result<(), CoreError> {
    let trimmed = purpose.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("purpose must not be empty"));
    }
    if trimmed.chars().count() > 1000 {
        return Err(CoreError::validation("purpose must be at most 1000 characters"));
    }
    Ok(())
}

pub fn validate_content(content: &str) -> Result<(), CoreError> {
    if content.is_empty() {
        return Err(CoreError::validation("content must not be empty"));
    }
    if content.len() > 100 * 1024 {
        return Err(CoreError::validation("content exceeds 100 KB"));
    }
    Ok(())
}

pub fn validate_metadata_size(value: &serde_json::Value) -> Result<(), CoreError> {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    if encoded.len() > 8 * 1024 {
        return Err(CoreError::validation("metadata exceeds 8 KB"));
    }
    Ok(())
}

pub fn validate_memory_key(key: &str) -> Result<(), CoreError> {
    if key.chars().count() > 255 {
        return Err(CoreError::validation("memory key exceeds 255 characters"));
    }
    if !memory_key_regex().is_match(key) {
        return Err(CoreError::validation(
            "memory key must match ^[A-Za-z0-9][A-Za-z0-9_.-]*$",
        ));
    }
    Ok(())
}

pub fn validate_memory_value(value: &str) -> Result<(), CoreError> {
    if value.len() > 100 * 1024 {
        return Err(CoreError::validation("memory value exceeds 100 KB"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_match_format() {
        for _ in 0..50 {
            let id = generate_session_id();
            assert!(is_valid_session_id(&id), "{id} did not match format");
        }
    }

    #[test]
    fn rejects_empty_purpose() {
        assert!(validate_purpose("   ").is_err());
    }

    #[test]
    fn rejects_bad_memory_key() {
        assert!(validate_memory_key("_leading-underscore").is_err());
        assert!(validate_memory_key("has space").is_err());
        assert!(validate_memory_key("valid.key-1_2").is_ok());
    }
}
