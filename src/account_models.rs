//! Users, roles, tenant companies and auth payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{FieldPatch, Pagination};

// ============ Roles ============

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolePatch {
    pub name: FieldPatch<String>,
    pub description: FieldPatch<String>,
    pub is_active: FieldPatch<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleFilter {
    /// Include roles with `is_active = false`.
    pub include_inactive: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl RoleFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

// ============ Users ============

/// A user joined with the name of their role.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub user_name: String,
    pub email: String,
    pub full_name: Option<String>,
    /// Argon2 PHC string; never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role_id: i64,
    pub role_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub user_name: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
    pub role_id: i64,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    pub user_name: FieldPatch<String>,
    pub email: FieldPatch<String>,
    pub full_name: FieldPatch<String>,
    /// Re-hashed when present.
    pub password: FieldPatch<String>,
    pub role_id: FieldPatch<i64>,
    pub is_active: FieldPatch<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub include_inactive: Option<bool>,
    pub role_id: Option<i64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl UserFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

// ============ Tenant companies ============

/// Connection record of a tenant company.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub host: String,
    #[serde(rename = "database")]
    pub database_name: String,
    #[serde(rename = "user")]
    pub db_user: String,
    #[serde(skip_serializing)]
    pub db_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompanyPatch {
    pub name: FieldPatch<String>,
    pub host: FieldPatch<String>,
    pub database: FieldPatch<String>,
    pub user: FieldPatch<String>,
    /// Empty strings leave the stored password untouched.
    pub password: FieldPatch<String>,
    pub is_active: FieldPatch<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyFilter {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl CompanyFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

// ============ Auth payloads ============

/// Either `user_name` or `email` identifies the account.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: User,
}
