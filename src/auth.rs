use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::account_models::{
    AuthResponse, AuthTokens, ChangePasswordRequest, CreateUserRequest, LoginRequest,
    RegisterRequest, User,
};
use crate::account_services::{RoleService, UserService};
use crate::errors::AppError;
use crate::handlers::AppState;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub user_name: String,
    pub email: String,
    pub role_id: i64,
    pub role_name: String,
    pub token_type: TokenType,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub user_id: i64,
    pub user_name: String,
    pub email: String,
    pub role_id: i64,
    pub role_name: String,
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            user_name: claims.user_name,
            email: claims.email,
            role_id: claims.role_id,
            role_name: claims.role_name,
        }
    }
}

/// HS256 keys and token lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, user: &User, token_type: TokenType) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.id,
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            role_id: user.role_id,
            role_name: user.role_name.clone(),
            token_type,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("JWT generation error: {}", e)))
    }

    /// Decodes and checks signature, expiry and token type.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| AppError::Unauthorized(format!("Invalid JWT token: {}", e)))?;
        if data.claims.token_type != expected {
            return Err(AppError::Unauthorized(format!(
                "expected {:?} token, got {:?}",
                expected, data.claims.token_type
            )));
        }
        Ok(data.claims)
    }

    pub fn issue_pair(&self, user: &User) -> Result<AuthTokens, AppError> {
        Ok(AuthTokens {
            access_token: self.issue(user, TokenType::Access)?,
            refresh_token: self.issue(user, TokenType::Refresh)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }
}

/// Hash a plain password with argon2id.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// Verify a password against an argon2id hash. Unparseable hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Bearer header first, then the `access_token` cookie.
fn extract_token(headers: &HeaderMap, jar: &CookieJar) -> Result<String, AppError> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header format".into()))?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Authorization header must use Bearer token format".into())
        })?;
        if token.trim().is_empty() {
            return Err(AppError::Unauthorized("Empty JWT token".into()));
        }
        return Ok(token.trim().to_string());
    }
    jar.get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".into()))
}

/// JWT authentication middleware: validates the access token and injects
/// [`CurrentUser`] into the request.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers(), &jar)?;
    let claims = state.jwt.validate(&token, TokenType::Access)?;
    request.extensions_mut().insert(CurrentUser::from(claims));
    Ok(next.run(request).await)
}

/// Login, registration, refresh and password changes.
#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    roles: RoleService,
    jwt: JwtKeys,
    default_role: String,
}

impl AuthService {
    pub fn new(users: UserService, roles: RoleService, jwt: JwtKeys, default_role: String) -> Self {
        Self {
            users,
            roles,
            jwt,
            default_role,
        }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        let user = match (req.user_name.as_deref(), req.email.as_deref()) {
            (Some(name), _) if !name.trim().is_empty() => self.users.find_by_user_name(name).await?,
            (_, Some(email)) if !email.trim().is_empty() => self.users.find_by_email(email).await?,
            _ => {
                return Err(AppError::Validation(
                    "user_name or email is required".to_string(),
                ))
            }
        };

        // Same message for unknown user and wrong password
        let user = match user {
            Some(user) if verify_password(&req.password, &user.password_hash) => user,
            _ => {
                tracing::warn!("Failed login attempt");
                return Err(AppError::Unauthorized("Invalid credentials".to_string()));
            }
        };
        if !user.is_active {
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }

        self.users.touch_last_login(user.id).await?;
        tracing::info!("User {} logged in", user.user_name);
        self.respond(user)
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AppError> {
        let role = self
            .roles
            .find_by_name(&self.default_role)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("default role '{}' is missing", self.default_role))
            })?;

        let user = self
            .users
            .create(CreateUserRequest {
                user_name: req.user_name,
                email: req.email,
                full_name: req.full_name,
                password: req.password,
                role_id: role.id,
                is_active: Some(true),
            })
            .await?;

        self.users.touch_last_login(user.id).await?;
        self.respond(user)
    }

    /// Exchanges a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AppError> {
        let claims = self.jwt.validate(refresh_token, TokenType::Refresh)?;
        let user = self
            .users
            .get(claims.sub)
            .await
            .map_err(|_| AppError::Unauthorized("Unknown user".to_string()))?;
        if !user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }
        self.respond(user)
    }

    pub async fn profile(&self, current: &CurrentUser) -> Result<User, AppError> {
        self.users.get(current.user_id).await
    }

    pub async fn change_password(
        &self,
        current: &CurrentUser,
        req: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        let user = self.users.get(current.user_id).await?;
        if !verify_password(&req.current_password, &user.password_hash) {
            return Err(AppError::Validation(
                "current password is incorrect".to_string(),
            ));
        }
        validate_new_password(&req.new_password)?;
        if req.new_password == req.current_password {
            return Err(AppError::Validation(
                "new password must differ from the current one".to_string(),
            ));
        }
        let hash = hash_password(&req.new_password)?;
        self.users.set_password_hash(user.id, &hash).await?;
        tracing::info!("User {} changed their password", user.user_name);
        Ok(())
    }

    fn respond(&self, user: User) -> Result<AuthResponse, AppError> {
        Ok(AuthResponse {
            tokens: self.jwt.issue_pair(&user)?,
            user,
        })
    }
}
