use std::env;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use taxpayer_registry_api::account_models::{
    CompanyPatch, CreateCompanyRequest, CreateRoleRequest, CreateUserRequest, Role, UserPatch,
};
use taxpayer_registry_api::account_services::{CompanyService, RoleService, UserService};
use taxpayer_registry_api::auth::verify_password;
use taxpayer_registry_api::db::Database;
use taxpayer_registry_api::errors::ErrorKind;

/// Account services against a real PostgreSQL database.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
async fn pool() -> anyhow::Result<PgPool> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    let db = Database::new(&db_url, 2).await?;
    db.migrate().await?;
    Ok(db.pool.clone())
}

/// Short unique suffix so repeated runs do not collide.
fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

async fn role(roles: &RoleService, is_active: bool) -> anyhow::Result<Role> {
    Ok(roles
        .create(CreateRoleRequest {
            name: format!("role-{}", tag()),
            description: Some("integration".to_string()),
            is_active: Some(is_active),
        })
        .await?)
}

fn user_request(role_id: i64) -> CreateUserRequest {
    let tag = tag();
    CreateUserRequest {
        user_name: format!("user-{}", tag),
        email: format!("user-{}@example.test", tag),
        full_name: Some("Integration User".to_string()),
        password: "first-password".to_string(),
        role_id,
        is_active: None,
    }
}

fn company_request() -> CreateCompanyRequest {
    CreateCompanyRequest {
        name: format!("company-{}", tag()),
        host: "db.internal".to_string(),
        database: "tenant".to_string(),
        user: "tenant_user".to_string(),
        password: "tenant-secret".to_string(),
        is_active: None,
    }
}

#[tokio::test]
#[ignore]
async fn role_held_by_active_user_cannot_be_deleted() -> anyhow::Result<()> {
    let pool = pool().await?;
    let roles = RoleService::new(pool.clone());
    let users = UserService::new(pool);

    let role = role(&roles, true).await?;
    let user = users.create(user_request(role.id)).await?;

    let err = roles
        .delete(role.id)
        .await
        .expect_err("role is still assigned");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(roles.get(role.id).await.is_ok());

    // Deactivating the holder releases the role
    let patch: UserPatch = serde_json::from_value(json!({ "is_active": false }))?;
    users.update(user.id, patch).await?;
    roles.delete(role.id).await?;
    assert_eq!(
        roles.get(role.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    users.delete(user.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn user_name_and_email_are_unique() -> anyhow::Result<()> {
    let pool = pool().await?;
    let roles = RoleService::new(pool.clone());
    let users = UserService::new(pool);

    let role = role(&roles, true).await?;
    let request = user_request(role.id);
    let user = users.create(request.clone()).await?;

    let mut same_name = user_request(role.id);
    same_name.user_name = request.user_name.clone();
    let err = users.create(same_name).await.expect_err("user_name taken");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut same_email = user_request(role.id);
    same_email.email = request.email.to_uppercase();
    let err = users.create(same_email).await.expect_err("email taken");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert!(!users.user_name_availability(&request.user_name).await?.available);
    let taken = users
        .email_availability(&format!(" {} ", request.email.to_uppercase()))
        .await?;
    assert!(!taken.available);
    assert_eq!(taken.value, request.email);

    users.delete(user.id).await?;
    assert!(users.user_name_availability(&request.user_name).await?.available);
    roles.delete(role.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn users_only_get_active_existing_roles() -> anyhow::Result<()> {
    let pool = pool().await?;
    let roles = RoleService::new(pool.clone());
    let users = UserService::new(pool);

    let inactive = role(&roles, false).await?;
    let err = users
        .create(user_request(inactive.id))
        .await
        .expect_err("inactive role");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = users
        .create(user_request(i64::MAX))
        .await
        .expect_err("missing role");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let active = role(&roles, true).await?;
    let user = users.create(user_request(active.id)).await?;
    let patch: UserPatch = serde_json::from_value(json!({ "role_id": inactive.id }))?;
    let err = users.update(user.id, patch).await.expect_err("inactive role");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(users.get(user.id).await?.role_id, active.id);

    users.delete(user.id).await?;
    roles.delete(active.id).await?;
    roles.delete(inactive.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn password_update_is_rehashed() -> anyhow::Result<()> {
    let pool = pool().await?;
    let roles = RoleService::new(pool.clone());
    let users = UserService::new(pool);

    let role = role(&roles, true).await?;
    let user = users.create(user_request(role.id)).await?;
    assert!(verify_password("first-password", &user.password_hash));

    let patch: UserPatch = serde_json::from_value(json!({ "full_name": "Renamed" }))?;
    let renamed = users.update(user.id, patch).await?;
    assert_eq!(renamed.password_hash, user.password_hash);

    let patch: UserPatch = serde_json::from_value(json!({ "password": "second-password" }))?;
    let updated = users.update(user.id, patch).await?;
    assert_ne!(updated.password_hash, "second-password");
    assert!(verify_password("second-password", &updated.password_hash));
    assert!(!verify_password("first-password", &updated.password_hash));

    users.delete(user.id).await?;
    roles.delete(role.id).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn company_names_are_unique_and_blank_password_is_ignored() -> anyhow::Result<()> {
    let pool = pool().await?;
    let companies = CompanyService::new(pool);

    let request = company_request();
    let company = companies.create(request.clone()).await?;

    let mut same_name = company_request();
    same_name.name = request.name.clone();
    let err = companies.create(same_name).await.expect_err("name taken");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let patch: CompanyPatch =
        serde_json::from_value(json!({ "host": "db2.internal", "password": "  " }))?;
    let updated = companies.update(company.id, patch).await?;
    assert_eq!(updated.host, "db2.internal");
    assert_eq!(updated.db_password, "tenant-secret");

    companies.delete(company.id).await?;
    assert_eq!(
        companies.delete(company.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}
