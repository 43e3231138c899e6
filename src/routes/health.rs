use crate::database::postgres_repository::PostgresRepository;
use crate::models::health::HealthResponse;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Liveness plus database reachability
#[openapi(tag = "Health")]
#[get("/")]
pub async fn healthcheck(pool: &State<PgPool>) -> (Status, Json<HealthResponse>) {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    if repo.ping().await {
        (Status::Ok, Json(HealthResponse { status: "ok", database: "up" }))
    } else {
        (
            Status::ServiceUnavailable,
            Json(HealthResponse {
                status: "degraded",
                database: "down",
            }),
        )
    }
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![healthcheck]
}
