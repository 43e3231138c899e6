use crate::error::app_error::ErrorBody;
use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::{Request, catch};
use std::io::Cursor;

/// A catcher response in the same `{success: false, error}` shape handlers use.
pub struct CaughtError {
    status: Status,
    message: &'static str,
    retry_after: Option<u64>,
}

impl CaughtError {
    fn new(status: Status, message: &'static str) -> Self {
        Self {
            status,
            message,
            retry_after: None,
        }
    }
}

impl<'r> Responder<'r, 'static> for CaughtError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = ErrorBody::json(self.message);
        let mut builder = Response::build();
        builder
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body));
        if let Some(secs) = self.retry_after {
            builder.header(Header::new("Retry-After", secs.to_string()));
        }
        builder.ok()
    }
}

#[catch(400)]
pub fn bad_request(_: &Request) -> CaughtError {
    CaughtError::new(Status::BadRequest, "Bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> CaughtError {
    CaughtError::new(Status::Unauthorized, "Unauthorized")
}

#[catch(404)]
pub fn not_found(_: &Request) -> CaughtError {
    CaughtError::new(Status::NotFound, "Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> CaughtError {
    CaughtError::new(Status::Conflict, "Conflict")
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> CaughtError {
    CaughtError::new(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> CaughtError {
    let retry_after = req.local_cache(|| None::<RateLimitRetryAfter>).as_ref().map(|r| r.0);
    CaughtError {
        retry_after,
        ..CaughtError::new(Status::TooManyRequests, "Too many requests")
    }
}

#[catch(500)]
pub fn internal_error(_: &Request) -> CaughtError {
    CaughtError::new(Status::InternalServerError, "Internal server error")
}

pub fn catchers() -> Vec<rocket::Catcher> {
    rocket::catchers![
        bad_request,
        unauthorized,
        not_found,
        conflict,
        unprocessable_entity,
        too_many_requests,
        internal_error
    ]
}
