use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::account_models::{
    Company, CompanyFilter, CompanyPatch, CreateCompanyRequest, CreateRoleRequest,
    CreateUserRequest, Role, RoleFilter, RolePatch, User, UserFilter, UserPatch,
};
use crate::auth::{hash_password, validate_new_password};
use crate::errors::{AppError, ResultExt};
use crate::models::{Availability, FieldPatch, Page};
use crate::validation::{check_len, normalize_email, require_email, require_non_blank};

/// Whether a live row of `table` other than `exclude_id` has `column = value`.
///
/// `table` and `column` are always compile-time constants.
async fn exists_live(
    pool: &PgPool,
    table: &'static str,
    column: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1 AND deleted_at IS NULL \
         AND ($2::BIGINT IS NULL OR id <> $2))",
        table, column
    );
    let (exists,): (bool,) = sqlx::query_as(&sql)
        .bind(value)
        .bind(exclude_id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to check {}.{} uniqueness", table, column))?;
    Ok(exists)
}

async fn ensure_free(
    pool: &PgPool,
    table: &'static str,
    column: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<(), AppError> {
    if exists_live(pool, table, column, value, exclude_id).await? {
        return Err(AppError::Conflict(format!(
            "{} '{}' is already registered",
            column, value
        )));
    }
    Ok(())
}

// ============ Roles ============

#[derive(Clone)]
pub struct RoleService {
    pool: PgPool,
}

impl RoleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate(name: &str, description: Option<&str>) -> Result<(), AppError> {
        require_non_blank("name", name)?;
        check_len("name", Some(name), 2, 50)?;
        check_len("description", description, 0, 250)
    }

    pub async fn create(&self, req: CreateRoleRequest) -> Result<Role, AppError> {
        let name = req.name.trim().to_string();
        Self::validate(&name, req.description.as_deref())?;
        ensure_free(&self.pool, "roles", "name", &name, None).await?;

        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description, is_active) VALUES ($1, $2, $3) \
             RETURNING id, name, description, is_active, created_at, updated_at",
        )
        .bind(&name)
        .bind(&req.description)
        .bind(req.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .context("Failed to create role")?;

        tracing::info!("Created role {} ({})", role.id, role.name);
        Ok(role)
    }

    pub async fn get(&self, id: i64) -> Result<Role, AppError> {
        sqlx::query_as::<_, Role>(
            "SELECT id, name, description, is_active, created_at, updated_at \
             FROM roles WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load role")?
        .ok_or_else(|| AppError::NotFound(format!("Role {} not found", id)))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        sqlx::query_as::<_, Role>(
            "SELECT id, name, description, is_active, created_at, updated_at \
             FROM roles WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load role by name")
    }

    pub async fn list(&self, filter: &RoleFilter) -> Result<Page<Role>, AppError> {
        let pagination = filter.pagination();
        let include_inactive = filter.include_inactive.unwrap_or(false);

        fn push_where(qb: &mut QueryBuilder<'_, Postgres>, include_inactive: bool) {
            qb.push(" WHERE deleted_at IS NULL");
            if !include_inactive {
                qb.push(" AND is_active = TRUE");
            }
        }

        let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM roles");
        push_where(&mut count_qb, include_inactive);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count roles")?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, name, description, is_active, created_at, updated_at FROM roles",
        );
        push_where(&mut qb, include_inactive);
        qb.push(" ORDER BY name LIMIT ")
            .push_bind(pagination.page_size())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let roles = qb
            .build_query_as::<Role>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list roles")?;

        Ok(Page::new(roles, total, &pagination))
    }

    pub async fn update(&self, id: i64, patch: RolePatch) -> Result<Role, AppError> {
        let mut role = self.get(id).await?;
        let previous_name = role.name.clone();
        patch.name.apply_required(&mut role.name, "name")?;
        patch.description.apply_to(&mut role.description);
        patch.is_active.apply_required(&mut role.is_active, "is_active")?;

        role.name = role.name.trim().to_string();
        Self::validate(&role.name, role.description.as_deref())?;
        if role.name != previous_name {
            ensure_free(&self.pool, "roles", "name", &role.name, Some(id)).await?;
        }

        let updated = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $2, description = $3, is_active = $4, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING id, name, description, is_active, created_at, updated_at",
        )
        .bind(id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_active)
        .fetch_one(&self.pool)
        .await
        .context("Failed to update role")?;

        tracing::info!("Updated role {}", id);
        Ok(updated)
    }

    /// Roles still assigned to active users cannot be deleted.
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.get(id).await?;
        let (in_use,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE role_id = $1 AND deleted_at IS NULL AND is_active",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count role users")?;
        if in_use > 0 {
            return Err(AppError::Validation(format!(
                "Role {} is assigned to {} active user(s)",
                id, in_use
            )));
        }

        sqlx::query("UPDATE roles SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete role")?;
        tracing::info!("Deleted role {}", id);
        Ok(())
    }
}

// ============ Users ============

const USER_SELECT: &str = "SELECT u.id, u.user_name, u.email, u.full_name, u.password_hash, \
     u.role_id, r.name AS role_name, u.is_active, u.last_login_at, u.created_at, u.updated_at \
     FROM users u JOIN roles r ON r.id = u.role_id";

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate(user_name: &str, email: &str, full_name: Option<&str>) -> Result<(), AppError> {
        require_non_blank("user_name", user_name)?;
        check_len("user_name", Some(user_name), 3, 50)?;
        if user_name.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(
                "user_name cannot contain whitespace".to_string(),
            ));
        }
        require_email(email)?;
        check_len("full_name", full_name, 0, 100)
    }

    /// The role must exist and be active.
    async fn ensure_assignable_role(&self, role_id: i64) -> Result<(), AppError> {
        let active: Option<(bool,)> =
            sqlx::query_as("SELECT is_active FROM roles WHERE id = $1 AND deleted_at IS NULL")
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load role")?;
        match active {
            Some((true,)) => Ok(()),
            Some((false,)) => Err(AppError::Validation(format!("Role {} is inactive", role_id))),
            None => Err(AppError::Validation(format!("Role {} does not exist", role_id))),
        }
    }

    pub async fn create(&self, req: CreateUserRequest) -> Result<User, AppError> {
        let user_name = req.user_name.trim().to_string();
        let email = normalize_email(&req.email);
        Self::validate(&user_name, &email, req.full_name.as_deref())?;
        validate_new_password(&req.password)?;
        self.ensure_assignable_role(req.role_id).await?;
        ensure_free(&self.pool, "users", "user_name", &user_name, None).await?;
        ensure_free(&self.pool, "users", "email", &email, None).await?;

        let password_hash = hash_password(&req.password)?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (user_name, email, full_name, password_hash, role_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&user_name)
        .bind(&email)
        .bind(&req.full_name)
        .bind(&password_hash)
        .bind(req.role_id)
        .bind(req.is_active.unwrap_or(true))
        .fetch_one(&self.pool)
        .await
        .context("Failed to create user")?;

        tracing::info!("Created user {} ({})", id, user_name);
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.find_one("u.id = $1", id).await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn find_one<T>(&self, condition: &'static str, value: T) -> Result<Option<User>, AppError>
    where
        T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let sql = format!("{} WHERE {} AND u.deleted_at IS NULL", USER_SELECT, condition);
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load user")
    }

    pub async fn find_by_user_name(&self, user_name: &str) -> Result<Option<User>, AppError> {
        self.find_one("u.user_name = $1", user_name.trim().to_string())
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one("u.email = $1", normalize_email(email)).await
    }

    pub async fn list(&self, filter: &UserFilter) -> Result<Page<User>, AppError> {
        let pagination = filter.pagination();

        fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
            qb.push(" WHERE u.deleted_at IS NULL");
            if !filter.include_inactive.unwrap_or(false) {
                qb.push(" AND u.is_active = TRUE");
            }
            if let Some(role_id) = filter.role_id {
                qb.push(" AND u.role_id = ").push_bind(role_id);
            }
        }

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users u");
        push_where(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(USER_SELECT);
        push_where(&mut qb, filter);
        qb.push(" ORDER BY u.id LIMIT ")
            .push_bind(pagination.page_size())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let users = qb
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        Ok(Page::new(users, total, &pagination))
    }

    pub async fn update(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let current = self.get(id).await?;
        let mut next = current.clone();

        patch.user_name.apply_required(&mut next.user_name, "user_name")?;
        patch.email.apply_required(&mut next.email, "email")?;
        patch.full_name.apply_to(&mut next.full_name);
        patch.role_id.apply_required(&mut next.role_id, "role_id")?;
        patch.is_active.apply_required(&mut next.is_active, "is_active")?;
        let mut new_password = None;
        patch.password.apply_present(&mut new_password, "password")?;

        next.user_name = next.user_name.trim().to_string();
        next.email = normalize_email(&next.email);
        Self::validate(&next.user_name, &next.email, next.full_name.as_deref())?;

        if next.user_name != current.user_name {
            ensure_free(&self.pool, "users", "user_name", &next.user_name, Some(id)).await?;
        }
        if next.email != current.email {
            ensure_free(&self.pool, "users", "email", &next.email, Some(id)).await?;
        }
        if next.role_id != current.role_id {
            self.ensure_assignable_role(next.role_id).await?;
        }
        if let Some(password) = new_password {
            validate_new_password(&password)?;
            next.password_hash = hash_password(&password)?;
        }

        sqlx::query(
            "UPDATE users SET user_name = $2, email = $3, full_name = $4, password_hash = $5, \
             role_id = $6, is_active = $7, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&next.user_name)
        .bind(&next.email)
        .bind(&next.full_name)
        .bind(&next.password_hash)
        .bind(next.role_id)
        .bind(next.is_active)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;

        tracing::info!("Updated user {}", id);
        self.get(id).await
    }

    pub async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .context("Failed to update password")?;
        Ok(())
    }

    pub async fn touch_last_login(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to record login")?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to delete user")?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    pub async fn user_name_availability(&self, user_name: &str) -> Result<Availability, AppError> {
        let value = user_name.trim().to_string();
        let taken = exists_live(&self.pool, "users", "user_name", &value, None).await?;
        Ok(Availability {
            field: "user_name",
            value,
            available: !taken,
        })
    }

    pub async fn email_availability(&self, email: &str) -> Result<Availability, AppError> {
        let value = normalize_email(email);
        let taken = exists_live(&self.pool, "users", "email", &value, None).await?;
        Ok(Availability {
            field: "email",
            value,
            available: !taken,
        })
    }
}

// ============ Tenant companies ============

const COMPANY_COLUMNS: &str =
    "id, name, host, database_name, db_user, db_password, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct CompanyService {
    pool: PgPool,
}

impl CompanyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate(company: &CreateCompanyRequest) -> Result<(), AppError> {
        for (field, value) in [
            ("name", &company.name),
            ("host", &company.host),
            ("database", &company.database),
            ("user", &company.user),
            ("password", &company.password),
        ] {
            require_non_blank(field, value)?;
            check_len(field, Some(value), 1, 100)?;
        }
        Ok(())
    }

    pub async fn create(&self, req: CreateCompanyRequest) -> Result<Company, AppError> {
        let req = CreateCompanyRequest {
            name: req.name.trim().to_string(),
            host: req.host.trim().to_string(),
            database: req.database.trim().to_string(),
            user: req.user.trim().to_string(),
            ..req
        };
        Self::validate(&req)?;
        ensure_free(&self.pool, "companies", "name", &req.name, None).await?;

        let sql = format!(
            "INSERT INTO companies (name, host, database_name, db_user, db_password, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            COMPANY_COLUMNS
        );
        let company = sqlx::query_as::<_, Company>(&sql)
            .bind(&req.name)
            .bind(&req.host)
            .bind(&req.database)
            .bind(&req.user)
            .bind(&req.password)
            .bind(req.is_active.unwrap_or(true))
            .fetch_one(&self.pool)
            .await
            .context("Failed to create company")?;

        tracing::info!("Created company {} ({})", company.id, company.name);
        Ok(company)
    }

    pub async fn get(&self, id: i64) -> Result<Company, AppError> {
        let sql = format!(
            "SELECT {} FROM companies WHERE id = $1 AND deleted_at IS NULL",
            COMPANY_COLUMNS
        );
        sqlx::query_as::<_, Company>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load company")?
            .ok_or_else(|| AppError::NotFound(format!("Company {} not found", id)))
    }

    pub async fn list(&self, filter: &CompanyFilter) -> Result<Page<Company>, AppError> {
        let pagination = filter.pagination();

        fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &CompanyFilter) {
            qb.push(" WHERE deleted_at IS NULL");
            if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                qb.push(" AND name ILIKE ")
                    .push_bind(format!("%{}%", name.replace('%', "\\%").replace('_', "\\_")));
            }
            if let Some(active) = filter.is_active {
                qb.push(" AND is_active = ").push_bind(active);
            }
        }

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM companies");
        push_where(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count companies")?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM companies", COMPANY_COLUMNS));
        push_where(&mut qb, filter);
        qb.push(" ORDER BY name LIMIT ")
            .push_bind(pagination.page_size())
            .push(" OFFSET ")
            .push_bind(pagination.offset());
        let companies = qb
            .build_query_as::<Company>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list companies")?;

        Ok(Page::new(companies, total, &pagination))
    }

    pub async fn update(&self, id: i64, patch: CompanyPatch) -> Result<Company, AppError> {
        let current = self.get(id).await?;
        let mut next = CreateCompanyRequest {
            name: current.name.clone(),
            host: current.host.clone(),
            database: current.database_name.clone(),
            user: current.db_user.clone(),
            password: current.db_password.clone(),
            is_active: Some(current.is_active),
        };

        patch.name.apply_required(&mut next.name, "name")?;
        patch.host.apply_required(&mut next.host, "host")?;
        patch.database.apply_required(&mut next.database, "database")?;
        patch.user.apply_required(&mut next.user, "user")?;
        if let FieldPatch::Set(password) = patch.password {
            if !password.trim().is_empty() {
                next.password = password;
            }
        }
        patch.is_active.apply_present(&mut next.is_active, "is_active")?;

        next.name = next.name.trim().to_string();
        Self::validate(&next)?;
        if next.name != current.name {
            ensure_free(&self.pool, "companies", "name", &next.name, Some(id)).await?;
        }

        let sql = format!(
            "UPDATE companies SET name = $2, host = $3, database_name = $4, db_user = $5, \
             db_password = $6, is_active = $7, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            COMPANY_COLUMNS
        );
        let company = sqlx::query_as::<_, Company>(&sql)
            .bind(id)
            .bind(&next.name)
            .bind(&next.host)
            .bind(&next.database)
            .bind(&next.user)
            .bind(&next.password)
            .bind(next.is_active.unwrap_or(true))
            .fetch_one(&self.pool)
            .await
            .context("Failed to update company")?;

        tracing::info!("Updated company {}", id);
        Ok(company)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE companies SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to delete company")?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Company {} not found", id)));
        }
        tracing::info!("Deleted company {}", id);
        Ok(())
    }
}
