use rocket::http::{ContentType, Header, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("Invalid settings format: {0}")]
    InvalidSettings(String),
    #[error("Mail provider error: {message}")]
    Provider { message: String },
    #[error("Mail connection was revoked, please reconnect the account")]
    ConnectionRevoked,
    #[error("Unsupported mail provider: {0}")]
    UnsupportedProvider(String),
    #[error("Internal server error")]
    Email { message: String },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into() }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::Email { message: message.into() }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::Validation(_) => Status::BadRequest,
            AppError::InvalidSettings(_) => Status::BadRequest,
            AppError::Provider { .. } => Status::BadGateway,
            AppError::ConnectionRevoked => Status::Unauthorized,
            AppError::UnsupportedProvider(_) => Status::BadRequest,
            AppError::Email { .. } => Status::InternalServerError,
        }
    }
}

/// Body shared by every failed action so the client renders one error shape.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub success: bool,
    pub error: &'a str,
}

impl ErrorBody<'_> {
    pub fn json(error: &str) -> String {
        serde_json::to_string(&ErrorBody { success: false, error }).unwrap_or_else(|_| r#"{"success":false}"#.to_string())
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::Session>)
            .as_ref()
            .map(|s| s.user_id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %req.method(),
            uri = %req.uri(),
            "request failed"
        );

        let status = Status::from(&self);
        let body = ErrorBody::json(&self.to_string());

        let mut response = Response::build();
        response.status(status).header(ContentType::JSON).sized_body(body.len(), Cursor::new(body));
        if matches!(self, AppError::Unauthorized | AppError::ConnectionRevoked) {
            response.header(Header::new("Cache-Control", "no-store"));
        }
        response.ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
            ("502", "Mail provider failure"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::Conflict(db_err.constraint().unwrap_or("unique constraint").to_string())
            }
            _ => AppError::db("Database error", e),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::provider(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_errors_hide_details() {
        let err = AppError::db("select failed", sqlx::Error::PoolTimedOut);
        assert_eq!(err.to_string(), "Internal server error");
        assert_eq!(Status::from(&err), Status::InternalServerError);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn error_body_is_unified() {
        let body = ErrorBody::json("Golden ticket already claimed");
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Golden ticket already claimed");
    }

    #[test]
    fn auth_failures_map_to_401() {
        assert_eq!(Status::from(&AppError::Unauthorized), Status::Unauthorized);
        assert_eq!(Status::from(&AppError::ConnectionRevoked), Status::Unauthorized);
        assert_eq!(Status::from(&AppError::provider("boom")), Status::BadGateway);
    }
}
