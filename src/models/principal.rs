use serde::{Deserialize, Serialize};

/// JWT claims issued by the identity provider.
///
/// `sub` is the principal id. Tokens handed to a device agent also carry
/// the `device_id` the agent acts for.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated operator a command is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

impl Principal {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}
