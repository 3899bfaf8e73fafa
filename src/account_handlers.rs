//! Auth, user, role and company endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use crate::account_models::*;
use crate::auth::{CurrentUser, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::errors::AppError;
use crate::handlers::{ApiResponse, AppState, ValidJson};
use crate::models::{Availability, Page};

type Envelope<T> = Json<ApiResponse<T>>;

fn auth_cookie(
    name: &'static str,
    value: String,
    max_age: chrono::Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

fn with_session_cookies(state: &AppState, jar: CookieJar, response: &AuthResponse) -> CookieJar {
    let secure = state.config.cookie_secure;
    jar.add(auth_cookie(
        ACCESS_COOKIE,
        response.tokens.access_token.clone(),
        state.jwt.access_ttl,
        secure,
    ))
    .add(auth_cookie(
        REFRESH_COOKIE,
        response.tokens.refresh_token.clone(),
        state.jwt.refresh_ttl,
        secure,
    ))
}

// ============ Auth ============

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<(CookieJar, Envelope<AuthResponse>), AppError> {
    let response = state.auth.login(request).await?;
    let jar = with_session_cookies(&state, jar, &response);
    Ok((jar, ApiResponse::with_message("Login successful", response)))
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Envelope<AuthResponse>), AppError> {
    let response = state.auth.register(request).await?;
    let jar = with_session_cookies(&state, jar, &response);
    Ok((
        StatusCode::CREATED,
        jar,
        ApiResponse::with_message("Registration successful", response),
    ))
}

/// POST /api/v1/auth/refresh
///
/// Reads the refresh token from its cookie, falling back to the body.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Envelope<AuthResponse>), AppError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let response = state.auth.refresh(&token).await?;
    let jar = with_session_cookies(&state, jar, &response);
    Ok((jar, ApiResponse::with_message("Token refreshed", response)))
}

/// POST /api/v1/auth/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, Envelope<()>) {
    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    (jar, ApiResponse::message("Logged out"))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Envelope<User>, AppError> {
    let user = state.auth.profile(&current).await?;
    Ok(ApiResponse::data(user))
}

pub async fn check_auth(Extension(current): Extension<CurrentUser>) -> Envelope<CurrentUser> {
    ApiResponse::with_message("Authenticated", current)
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    ValidJson(request): ValidJson<ChangePasswordRequest>,
) -> Result<Envelope<()>, AppError> {
    state.auth.change_password(&current, request).await?;
    Ok(ApiResponse::message("Password changed"))
}

// ============ Roles ============

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RoleFilter>,
) -> Result<Envelope<Page<Role>>, AppError> {
    Ok(ApiResponse::data(state.roles.list(&filter).await?))
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<CreateRoleRequest>,
) -> Result<(StatusCode, Envelope<Role>), AppError> {
    let role = state.roles.create(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Role created", role),
    ))
}

pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<Role>, AppError> {
    Ok(ApiResponse::data(state.roles.get(id).await?))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidJson(patch): ValidJson<RolePatch>,
) -> Result<Envelope<Role>, AppError> {
    let role = state.roles.update(id, patch).await?;
    Ok(ApiResponse::with_message("Role updated", role))
}

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<()>, AppError> {
    state.roles.delete(id).await?;
    Ok(ApiResponse::message("Role deleted"))
}

// ============ Users ============

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<UserFilter>,
) -> Result<Envelope<Page<User>>, AppError> {
    Ok(ApiResponse::data(state.users.list(&filter).await?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<CreateUserRequest>,
) -> Result<(StatusCode, Envelope<User>), AppError> {
    let user = state.users.create(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("User created", user),
    ))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<User>, AppError> {
    Ok(ApiResponse::data(state.users.get(id).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidJson(patch): ValidJson<UserPatch>,
) -> Result<Envelope<User>, AppError> {
    let user = state.users.update(id, patch).await?;
    Ok(ApiResponse::with_message("User updated", user))
}

/// Users cannot delete their own account.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Envelope<()>, AppError> {
    if current.user_id == id {
        return Err(AppError::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }
    state.users.delete(id).await?;
    Ok(ApiResponse::message("User deleted"))
}

pub async fn check_username(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Envelope<Availability>, AppError> {
    Ok(ApiResponse::data(
        state.users.user_name_availability(&query.username).await?,
    ))
}

pub async fn check_user_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailQuery>,
) -> Result<Envelope<Availability>, AppError> {
    Ok(ApiResponse::data(
        state.users.email_availability(&query.email).await?,
    ))
}

// ============ Companies ============

pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CompanyFilter>,
) -> Result<Envelope<Page<Company>>, AppError> {
    Ok(ApiResponse::data(state.companies.list(&filter).await?))
}

pub async fn create_company(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<CreateCompanyRequest>,
) -> Result<(StatusCode, Envelope<Company>), AppError> {
    let company = state.companies.create(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Company created", company),
    ))
}

pub async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<Company>, AppError> {
    Ok(ApiResponse::data(state.companies.get(id).await?))
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidJson(patch): ValidJson<CompanyPatch>,
) -> Result<Envelope<Company>, AppError> {
    let company = state.companies.update(id, patch).await?;
    Ok(ApiResponse::with_message("Company updated", company))
}

pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<()>, AppError> {
    state.companies.delete(id).await?;
    Ok(ApiResponse::message("Company deleted"))
}
