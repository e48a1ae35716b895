use crate::error::{DomainError, DomainResult};

pub const SECURITY_KEY_LEN: usize = 20;

/// Normalizes an unlock key and checks its length.
///
/// This is a shape check only. The key is forwarded to the agent, which
/// verifies it against the secret held on the device.
pub fn validate_security_key(input: &str) -> DomainResult<String> {
    let normalized: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let length = normalized.chars().count();
    if length != SECURITY_KEY_LEN {
        return Err(DomainError::InvalidSecurityKey { length });
    }
    Ok(normalized)
}
