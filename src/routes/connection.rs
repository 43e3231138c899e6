use crate::auth::Session;
use crate::database::postgres_repository::PostgresRepository;
use crate::driver::ProviderDriverFactory;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::action::ActionResponse;
use crate::models::connection::ConnectionResponse;
use crate::service::cache::ViewCache;
use crate::service::connection::ConnectionService;
use rocket::serde::json::Json;
use rocket::{State, delete, get, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use std::sync::Arc;

/// List the caller's linked mail accounts
#[openapi(tag = "Connections")]
#[get("/")]
pub async fn list_connections(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
) -> Result<Json<Vec<ConnectionResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = ConnectionService::new(&repo, drivers.inner(), cache.inner());
    Ok(Json(service.list_connections(&session).await?))
}

/// The connection mail actions currently operate on
#[openapi(tag = "Connections")]
#[get("/active")]
pub async fn get_active_connection(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
) -> Result<Json<ConnectionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = ConnectionService::new(&repo, drivers.inner(), cache.inner());
    let connection = service.get_active_connection(&session).await?;
    Ok(Json(ConnectionResponse::from_connection(&connection, session.connection_id)))
}

/// Select which linked account the session operates on
#[openapi(tag = "Connections")]
#[put("/<id>/active")]
pub async fn set_active_connection(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    id: &str,
) -> Result<Json<ConnectionResponse>, AppError> {
    let connection_id = Uuid::parse_str(id).map_err(|_| AppError::BadRequest("Invalid connection id".to_string()))?;
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = ConnectionService::new(&repo, drivers.inner(), cache.inner());
    Ok(Json(service.set_active_connection(&session, &connection_id).await?))
}

/// Unlink the active mail account
#[openapi(tag = "Connections")]
#[delete("/active")]
pub async fn delete_active_connection(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
) -> Result<Json<ActionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = ConnectionService::new(&repo, drivers.inner(), cache.inner());
    service.delete_active_connection(&session).await?;
    Ok(Json(ActionResponse::ok()))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_connections, get_active_connection, set_active_connection, delete_active_connection]
}
