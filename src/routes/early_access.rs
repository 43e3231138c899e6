use crate::auth::Session;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::{RateLimit, ReferralRateLimit};
use crate::models::action::ActionResponse;
use crate::models::early_access::{EarlyAccessStatusResponse, EmailRequest, TicketOutcome};
use crate::service::early_access::EarlyAccessService;
use crate::service::email::EmailService;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Give the caller's golden ticket to someone else
///
/// A refused claim is reported as `{success: false, error}` with status 200.
#[openapi(tag = "Early Access")]
#[post("/golden-ticket", data = "<payload>")]
pub async fn golden_ticket(
    pool: &State<PgPool>,
    email: &State<EmailService>,
    _rate_limit: ReferralRateLimit,
    session: Session,
    payload: Json<EmailRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = EarlyAccessService::new(&repo, email.inner(), email.app_url());
    Ok(Json(match service.handle_golden_ticket(&session, &payload).await? {
        TicketOutcome::Claimed => ActionResponse::ok(),
        TicketOutcome::Rejected(rejection) => ActionResponse::failed(rejection.message()),
    }))
}

/// Join the early-access waitlist
#[openapi(tag = "Early Access")]
#[post("/waitlist", data = "<payload>")]
pub async fn join_waitlist(
    pool: &State<PgPool>,
    email: &State<EmailService>,
    _rate_limit: ReferralRateLimit,
    payload: Json<EmailRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    EarlyAccessService::new(&repo, email.inner(), email.app_url())
        .join_waitlist(&payload)
        .await?;
    Ok(Json(ActionResponse::ok()))
}

/// Early-access state of the caller
#[openapi(tag = "Early Access")]
#[get("/status")]
pub async fn status(
    pool: &State<PgPool>,
    email: &State<EmailService>,
    _rate_limit: RateLimit,
    session: Session,
) -> Result<Json<EarlyAccessStatusResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let status = EarlyAccessService::new(&repo, email.inner(), email.app_url()).status(&session).await?;
    Ok(Json(status))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![golden_ticket, join_waitlist, status]
}
