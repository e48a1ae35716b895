use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::models::principal::{Claims, Principal};
use crate::AppState;

/// Extractor for authenticated console requests. No token, no operation.
/// Device-bound agent tokens are refused.
pub struct AuthUser {
    pub principal: Principal,
}

/// Extractor for device agents: the token must name the device.
pub struct AgentAuth {
    pub principal: Principal,
    pub device_id: String,
}

fn bearer_token(parts: &Parts) -> Result<String, (StatusCode, &'static str)> {
    let header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization format"))
}

fn bearer_claims(parts: &Parts, secret: &str) -> Result<Claims, (StatusCode, &'static str)> {
    let token = bearer_token(parts)?;
    validate_token(&token, secret)
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let claims = bearer_claims(parts, &state.jwt_secret);

        async move {
            let claims = claims?;
            if claims.device_id.is_some() {
                return Err((StatusCode::FORBIDDEN, "Agent tokens cannot use console routes"));
            }
            Ok(AuthUser {
                principal: Principal {
                    id: claims.sub,
                    email: claims.email,
                },
            })
        }
    }
}

impl FromRequestParts<AppState> for AgentAuth {
    type Rejection = (StatusCode, &'static str);

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let claims = bearer_claims(parts, &state.jwt_secret);

        async move {
            let claims = claims?;
            let device_id = claims
                .device_id
                .ok_or((StatusCode::FORBIDDEN, "Token is not bound to a device"))?;
            Ok(AgentAuth {
                principal: Principal {
                    id: claims.sub,
                    email: claims.email,
                },
                device_id,
            })
        }
    }
}

/// Validate a token string and return claims. Used by WebSocket auth.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ()> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ())
}

#[cfg(test)]
pub(crate) fn create_token(
    user_id: &str,
    device_id: Option<&str>,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        device_id: device_id.map(str::to_string),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
