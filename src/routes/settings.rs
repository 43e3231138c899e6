use crate::auth::Session;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::action::ActionResponse;
use crate::models::settings::SettingsResponse;
use crate::service::settings::SettingsService;
use rocket::serde::json::Json;
use rocket::{State, get, put};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Get the caller's settings, or defaults if none were saved
#[openapi(tag = "Settings")]
#[get("/")]
pub async fn get_settings(pool: &State<PgPool>, _rate_limit: RateLimit, session: Session) -> Result<Json<SettingsResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let settings = SettingsService::new(&repo).get_user_settings(&session).await?;
    Ok(Json(settings))
}

/// Replace the caller's settings document
#[openapi(tag = "Settings")]
#[put("/", data = "<payload>")]
pub async fn put_settings(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    session: Session,
    payload: Json<serde_json::Value>,
) -> Result<Json<ActionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    SettingsService::new(&repo).save_user_settings(&session, payload.into_inner()).await?;
    Ok(Json(ActionResponse::ok()))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_settings, put_settings]
}
