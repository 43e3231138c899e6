use crate::config::SessionConfig;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// The authenticated caller and the mail connection currently selected for it.
///
/// Resolved once per request by the guard below and then passed explicitly to
/// every service call; services never look at request state themselves.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub connection_id: Option<Uuid>,
}

impl Session {
    /// The active connection, or `Unauthorized` when none is selected.
    pub fn require_connection(&self) -> Result<Uuid, AppError> {
        self.connection_id.ok_or(AppError::Unauthorized)
    }
}

pub(crate) fn parse_session_cookie_value(value: &str) -> Option<(Uuid, Uuid)> {
    let (session_id_str, user_id_str) = value.split_once(':')?;
    let session_id = Uuid::parse_str(session_id_str).ok()?;
    let user_id = Uuid::parse_str(user_id_str).ok()?;
    Some((session_id, user_id))
}

pub(crate) fn session_cookie_name(req: &Request<'_>) -> String {
    req.rocket()
        .state::<SessionConfig>()
        .map(|config| config.cookie_name.clone())
        .unwrap_or_else(|| SessionConfig::default().cookie_name)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let cookie_name = session_cookie_name(req);
        let Some((session_id, user_id)) = req
            .cookies()
            .get_private(&cookie_name)
            .and_then(|cookie| parse_session_cookie_value(cookie.value()))
        else {
            return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
        };

        let pool = match req.rocket().state::<PgPool>() {
            Some(pool) => pool,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };
        let repo = PostgresRepository { pool: pool.clone() };

        match repo.get_active_session(&session_id, &user_id).await {
            Ok(Some(session)) => {
                req.local_cache(|| Some(session.clone()));
                Outcome::Success(session)
            }
            Ok(None) => {
                if let Err(err) = repo.delete_session_if_expired(&session_id).await {
                    tracing::warn!(error = %err, session_id = %session_id, "failed to purge expired session");
                }
                Outcome::Error((Status::Unauthorized, AppError::Unauthorized))
            }
            Err(err) => Outcome::Error((Status::InternalServerError, err)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for Session {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Cookie-based session issued by the authentication provider.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: SessionConfig::default().cookie_name,
                location: "cookie".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("cookieAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response};
        let mut responses = Responses::default();
        responses.responses.insert(
            "401".to_string(),
            RefOr::Object(Response {
                description: "Unauthorized - no session or no active connection".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}
