// /saree-store/services/order-service/src/middleware/auth.rs

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::JwtSettings,
    models::{Identity, Role},
    utils::{
        error::{AppError, AppResult},
        validator::validate_guest_session,
    },
    AppState,
};

pub const GUEST_SESSION_HEADER: &str = "x-guest-session";

/// Claims issued by the auth service
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

/// Verify JWT dari auth service, tanpa network call
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        validation.validate_exp = true;
        validation.leeway = 60;

        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!("JWT rejected: {}", e);
            AppError::Unauthorized("Token tidak valid atau expired".to_string())
        })?;

        let id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid user ID dalam token".to_string()))?;

        Ok(Identity::User {
            id,
            role: parse_role(&data.claims.role),
            email: data.claims.email,
        })
    }
}

fn parse_role(raw: &str) -> Role {
    if raw.eq_ignore_ascii_case("admin") {
        Role::Admin
    } else {
        Role::Customer
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim)
}

/// Identity dari headers gateway (kalau trusted)
fn gateway_identity(headers: &HeaderMap) -> AppResult<Option<Identity>> {
    if headers.get("x-gateway-request").is_none() {
        return Ok(None);
    }
    let Some(raw_id) = header_str(headers, "x-user-id") else {
        return Ok(None);
    };

    let id = raw_id
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized("Format X-User-Id tidak valid".to_string()))?;

    Ok(Some(Identity::User {
        id,
        role: header_str(headers, "x-user-role").map(parse_role).unwrap_or(Role::Customer),
        email: header_str(headers, "x-user-email")
            .filter(|email| !email.is_empty())
            .map(str::to_string),
    }))
}

/// Resolve the caller: bearer token, trusted gateway headers, guest session, else anonymous
pub fn resolve_identity(headers: &HeaderMap, verifier: &TokenVerifier, trust_gateway: bool) -> AppResult<Identity> {
    if let Some(value) = header_str(headers, "authorization") {
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Authorization harus Bearer token".to_string()))?;
        return verifier.verify(token.trim());
    }

    if trust_gateway {
        if let Some(identity) = gateway_identity(headers)? {
            return Ok(identity);
        }
    }

    if let Some(session) = header_str(headers, GUEST_SESSION_HEADER) {
        return Ok(Identity::Guest {
            session: validate_guest_session(session)?,
        });
    }

    Ok(Identity::Anonymous)
}

/// Middleware: attach the caller's `Identity` to the request
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let identity = resolve_identity(req.headers(), &state.auth, state.config.trust_gateway_headers)?;

    if let Identity::User { id, role, .. } = &identity {
        tracing::debug!("Authenticated user={} role={:?} path={}", id, role, req.uri().path());
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Guard untuk /api/admin routes
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        Some(identity) if identity.is_admin() => {
            tracing::info!("Admin access: {} {} by user {:?}", req.method(), req.uri().path(), identity.user_id());
            Ok(next.run(req).await)
        }
        Some(Identity::User { id, .. }) => {
            tracing::warn!("Non-admin user {} mencoba akses admin: {}", id, req.uri().path());
            Err(AppError::Forbidden("Akses admin diperlukan".to_string()))
        }
        _ => Err(AppError::Unauthorized("Authorization header diperlukan".to_string())),
    }
}
