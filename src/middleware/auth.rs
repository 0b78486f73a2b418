use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::role::{Principal, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    pub fn principal(&self) -> Option<Principal> {
        let user_id = Uuid::parse_str(&self.sub).ok()?;
        let role = match self.role.as_deref() {
            None => Role::Learner,
            Some(raw) => raw.parse::<Role>().ok()?,
        };
        Some(Principal { user_id, role })
    }
}

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response()
}

pub async fn require_bearer_auth(mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(_) => return unauthorized("invalid_token"),
    };

    let Some(principal) = claims.principal() else {
        tracing::warn!(sub = %claims.sub, role = ?claims.role, "rejecting token with unknown subject or role");
        return unauthorized("invalid_principal");
    };

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(principal);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Option<&str>) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: 0,
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn missing_role_defaults_to_learner() {
        let id = Uuid::new_v4();
        let p = claims(&id.to_string(), None).principal().unwrap();
        assert_eq!(p, Principal { user_id: id, role: Role::Learner });
    }

    #[test]
    fn unknown_role_or_subject_yields_no_principal() {
        assert!(claims(&Uuid::new_v4().to_string(), Some("root")).principal().is_none());
        assert!(claims("tester", Some("admin")).principal().is_none());
    }
}
