use crate::account_services::{CompanyService, RoleService, UserService};
use crate::auth::{AuthService, JwtKeys};
use crate::config::Config;
use crate::db::Database;
use crate::errors::AppError;
use crate::models::*;
use crate::reconciliation::{ConsultOutcome, ReconciliationEngine};
use crate::registry_client::RegistryClient;
use crate::services::TaxpayerService;
use crate::taxpayer_store::{TaxpayerStore, UniqueField};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    pub jwt: JwtKeys,
    pub taxpayers: TaxpayerService,
    pub reconciliation: ReconciliationEngine,
    pub users: UserService,
    pub roles: RoleService,
    pub companies: CompanyService,
    pub auth: AuthService,
}

impl AppState {
    /// Wires every service. Taxpayer persistence goes through `store`; the
    /// account services use `db` directly.
    pub fn new(db: PgPool, config: Config, store: Arc<dyn TaxpayerStore>) -> Result<Self, AppError> {
        let jwt = JwtKeys::new(
            &config.jwt_secret,
            chrono::Duration::minutes(config.access_token_ttl_minutes),
            chrono::Duration::days(config.refresh_token_ttl_days),
        );
        let registry = RegistryClient::new(
            config.registry_api_url.clone(),
            config.registry_api_key.clone(),
        )?;
        let users = UserService::new(db.clone());
        let roles = RoleService::new(db.clone());

        Ok(Self {
            taxpayers: TaxpayerService::new(store.clone()),
            reconciliation: ReconciliationEngine::new(registry, store),
            auth: AuthService::new(
                users.clone(),
                roles.clone(),
                jwt.clone(),
                config.default_role.clone(),
            ),
            companies: CompanyService::new(db.clone()),
            users,
            roles,
            jwt,
            db,
            config,
        })
    }
}

/// Success envelope: `{status: "success", message?, data?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: Some(message.into()),
            data: None,
        })
    }
}

/// `Json` extractor whose rejections use the error envelope.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

type Envelope<T> = Json<ApiResponse<T>>;

/// Health check endpoint. Reports the database as degraded rather than
/// failing the check.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match Database::ping(&state.db).await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            "down"
        }
    };
    (
        StatusCode::OK,
        Json(json!({
            "status": if database == "up" { "healthy" } else { "degraded" },
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
        })),
    )
}

/// GET /api/v1/info
pub async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Taxpayer registry API: citizens, companies, users, roles and registry consults",
        "endpoints": {
            "auth": "/api/v1/auth",
            "citizens": "/api/v1/citizens",
            "companies": "/api/v1/companies",
            "users": "/api/v1/users",
            "roles": "/api/v1/roles",
            "consult": "/api/v1/consult",
        }
    }))
}

/// POST /api/v1/consult
///
/// Returns the raw registry document, or `{status: "invalid"}` when the
/// identification has the wrong shape.
pub async fn consult(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<ConsultRequest>,
) -> Result<Json<ConsultOutcome>, AppError> {
    if request.token.trim().is_empty() {
        return Err(AppError::Validation("token is required".to_string()));
    }
    let outcome = state.reconciliation.reconcile(&request).await?;
    Ok(Json(outcome))
}

// ============ Citizens ============

/// GET /api/v1/citizens
pub async fn list_citizens(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TaxpayerFilter>,
) -> Result<Envelope<Page<TaxpayerResponse>>, AppError> {
    tracing::info!("GET /citizens - filter: {:?}", filter);
    let page = state.taxpayers.list(&filter).await?;
    Ok(ApiResponse::data(page.map(TaxpayerResponse::from)))
}

/// POST /api/v1/citizens
pub async fn create_citizen(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<CreateTaxpayerRequest>,
) -> Result<(StatusCode, Envelope<TaxpayerResponse>), AppError> {
    let created = state.taxpayers.create(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Citizen created", TaxpayerResponse::from(created)),
    ))
}

pub async fn get_citizen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<TaxpayerResponse>, AppError> {
    let taxpayer = state.taxpayers.get(id).await?;
    Ok(ApiResponse::data(taxpayer.into()))
}

/// PUT/PATCH /api/v1/citizens/:id
pub async fn update_citizen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    ValidJson(patch): ValidJson<TaxpayerPatch>,
) -> Result<Envelope<TaxpayerResponse>, AppError> {
    let updated = state.taxpayers.update(id, patch).await?;
    Ok(ApiResponse::with_message("Citizen updated", updated.into()))
}

pub async fn delete_citizen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Envelope<()>, AppError> {
    state.taxpayers.delete(id).await?;
    Ok(ApiResponse::message("Citizen deleted"))
}

pub async fn get_citizen_by_email(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Envelope<TaxpayerResponse>, AppError> {
    let taxpayer = state.taxpayers.get_by_email(&email).await?;
    Ok(ApiResponse::data(taxpayer.into()))
}

pub async fn get_citizen_by_identification(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Envelope<TaxpayerResponse>, AppError> {
    let taxpayer = state.taxpayers.get_by_identification(&number).await?;
    Ok(ApiResponse::data(taxpayer.into()))
}

pub async fn get_citizen_by_legal_name(
    State(state): State<Arc<AppState>>,
    Path(legal_name): Path<String>,
) -> Result<Envelope<TaxpayerResponse>, AppError> {
    let taxpayer = state.taxpayers.get_by_legal_name(&legal_name).await?;
    Ok(ApiResponse::data(taxpayer.into()))
}

pub async fn check_identification(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Envelope<Availability>, AppError> {
    let result = state
        .taxpayers
        .availability(UniqueField::IdentificationNumber, &number)
        .await?;
    Ok(ApiResponse::data(result))
}

pub async fn check_email(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Envelope<Availability>, AppError> {
    let result = state.taxpayers.availability(UniqueField::Email, &email).await?;
    Ok(ApiResponse::data(result))
}

pub async fn check_legal_name(
    State(state): State<Arc<AppState>>,
    Path(legal_name): Path<String>,
) -> Result<Envelope<Availability>, AppError> {
    let result = state
        .taxpayers
        .availability(UniqueField::LegalName, &legal_name)
        .await?;
    Ok(ApiResponse::data(result))
}
