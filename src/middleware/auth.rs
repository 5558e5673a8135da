use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::{Identity, Role};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    fn into_identity(self) -> Result<Identity> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("invalid_subject".to_string()))?;
        let role = self
            .role
            .as_deref()
            .ok_or_else(|| Error::Unauthorized("missing_role".to_string()))?
            .parse::<Role>()?;
        Ok(Identity {
            user_id,
            role,
            email: self.email,
        })
    }
}

/// Resolves the bearer token into an `Identity` request extension.
pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Error::Unauthorized("missing_authorization".to_string()).into_response();
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Error::Unauthorized("bad_authorization".to_string()).into_response();
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Error::Unauthorized("unsupported_scheme".to_string()).into_response();
    };

    match verify_token(token, &state.config.jwt_secret) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            e.into_response()
        }
    }
}

/// Lets the request through only for the role given as layer state. Runs after `require_bearer_auth`.
pub async fn require_role(State(required): State<Role>, req: Request, next: Next) -> Response {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.role == required => next.run(req).await,
        Some(identity) => Error::Forbidden(format!(
            "{} access required, caller is {}",
            required.as_str(),
            identity.role.as_str()
        ))
        .into_response(),
        None => Error::Unauthorized("missing_authorization".to_string()).into_response(),
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Identity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;
    data.claims.into_identity()
}

/// Mints an HS256 token the way the identity provider does. Used by tests and local tooling.
pub fn issue_token(identity: &Identity, secret: &str, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: identity.user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        role: Some(identity.role.as_str().to_string()),
        email: identity.email.clone(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("token encoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_resolves_to_identity() {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Staff,
            email: Some("grader@example.com".into()),
        };
        let token = issue_token(&identity, "secret", Duration::minutes(5)).unwrap();
        assert_eq!(verify_token(&token, "secret").unwrap(), identity);
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn unknown_role_is_unauthorized() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 0,
            role: Some("hr".into()),
            email: None,
        };
        assert!(matches!(claims.into_identity(), Err(Error::Unauthorized(_))));
    }
}
