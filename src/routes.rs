use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::account_handlers;
use crate::auth::require_auth;
use crate::config::Config;
use crate::handlers::{self, AppState};

/// Every `/api/v1` route. Auth endpoints and `/info` are public; the rest
/// require a valid access token.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/info", get(handlers::info))
        .route("/auth/login", post(account_handlers::login))
        .route("/auth/register", post(account_handlers::register))
        .route("/auth/refresh", post(account_handlers::refresh))
        .route("/auth/logout", post(account_handlers::logout));

    let protected = Router::new()
        // Session
        .route("/profile", get(account_handlers::profile))
        .route("/check-auth", get(account_handlers::check_auth))
        .route("/change-password", post(account_handlers::change_password))
        // Registry consult
        .route("/consult", post(handlers::consult))
        // Citizens
        .route(
            "/citizens",
            get(handlers::list_citizens).post(handlers::create_citizen),
        )
        .route(
            "/citizens/:id",
            get(handlers::get_citizen)
                .put(handlers::update_citizen)
                .patch(handlers::update_citizen)
                .delete(handlers::delete_citizen),
        )
        .route("/citizens/email/:email", get(handlers::get_citizen_by_email))
        .route(
            "/citizens/identification/:numero",
            get(handlers::get_citizen_by_identification),
        )
        .route(
            "/citizens/razon-social/:razon",
            get(handlers::get_citizen_by_legal_name),
        )
        .route(
            "/citizens/check/identification/:numero",
            get(handlers::check_identification),
        )
        .route("/citizens/check/email/:email", get(handlers::check_email))
        .route(
            "/citizens/check/razon-social/:razon",
            get(handlers::check_legal_name),
        )
        // Companies
        .route(
            "/companies",
            get(account_handlers::list_companies).post(account_handlers::create_company),
        )
        .route(
            "/companies/:id",
            get(account_handlers::get_company)
                .put(account_handlers::update_company)
                .patch(account_handlers::update_company)
                .delete(account_handlers::delete_company),
        )
        // Roles
        .route(
            "/roles",
            get(account_handlers::list_roles).post(account_handlers::create_role),
        )
        .route(
            "/roles/:id",
            get(account_handlers::get_role)
                .put(account_handlers::update_role)
                .patch(account_handlers::update_role)
                .delete(account_handlers::delete_role),
        )
        // Users
        .route(
            "/users",
            get(account_handlers::list_users).post(account_handlers::create_user),
        )
        .route("/users/check-username", get(account_handlers::check_username))
        .route("/users/check-email", get(account_handlers::check_user_email))
        .route(
            "/users/:id",
            get(account_handlers::get_user)
                .put(account_handlers::update_user)
                .patch(account_handlers::update_user)
                .delete(account_handlers::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(protected)
}

/// Full application: `/health` at the root, `api` nested under `/api/v1`.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Credentialed CORS for `FRONT_URL`, permissive otherwise.
pub fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let Some(origin) = config.front_url.as_deref() else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .map_err(|e| anyhow::anyhow!("FRONT_URL is not a valid origin: {}", e))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]))
}
