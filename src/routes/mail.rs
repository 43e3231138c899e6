use crate::auth::Session;
use crate::database::postgres_repository::PostgresRepository;
use crate::driver::ProviderDriverFactory;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::mail::{
    Folder, FolderCount, MarkThreadsRequest, ModifyLabelsRequest, MoveThreadsRequest, MutationReport, ThreadDetail, ThreadPage,
};
use crate::service::cache::ViewCache;
use crate::service::connection::ConnectionService;
use crate::service::mail::MailService;
use rocket::form::FromFormField;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use schemars::JsonSchema;
use sqlx::PgPool;
use std::sync::Arc;

/// Folder query parameter; defaults to the inbox.
#[derive(Debug, Clone, Copy, FromFormField, JsonSchema)]
pub enum FolderParam {
    #[field(value = "inbox")]
    Inbox,
    #[field(value = "archive")]
    Archive,
    #[field(value = "spam")]
    Spam,
    #[field(value = "bin")]
    Bin,
}

impl From<FolderParam> for Folder {
    fn from(param: FolderParam) -> Self {
        match param {
            FolderParam::Inbox => Folder::Inbox,
            FolderParam::Archive => Folder::Archive,
            FolderParam::Spam => Folder::Spam,
            FolderParam::Bin => Folder::Bin,
        }
    }
}

fn service<'a>(repo: &'a PostgresRepository, drivers: &'a ProviderDriverFactory, cache: &'a ViewCache) -> MailService<'a> {
    MailService::new(ConnectionService::new(repo, drivers, cache), cache)
}

/// Mark threads as read
#[openapi(tag = "Mail")]
#[post("/read", data = "<payload>")]
pub async fn mark_as_read(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    payload: Json<MarkThreadsRequest>,
) -> Result<Json<MutationReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let report = service(&repo, drivers, cache).mark_as_read(&session, &payload).await?;
    Ok(Json(report))
}

/// Mark threads as unread
#[openapi(tag = "Mail")]
#[post("/unread", data = "<payload>")]
pub async fn mark_as_unread(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    payload: Json<MarkThreadsRequest>,
) -> Result<Json<MutationReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let report = service(&repo, drivers, cache).mark_as_unread(&session, &payload).await?;
    Ok(Json(report))
}

/// Move threads between folders
#[openapi(tag = "Mail")]
#[post("/move", data = "<payload>")]
pub async fn move_threads(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    payload: Json<MoveThreadsRequest>,
) -> Result<Json<MutationReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let report = service(&repo, drivers, cache).move_threads_to(&session, &payload).await?;
    Ok(Json(report))
}

/// Add and remove labels on threads
#[openapi(tag = "Mail")]
#[post("/labels", data = "<payload>")]
pub async fn modify_labels(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    payload: Json<ModifyLabelsRequest>,
) -> Result<Json<MutationReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let report = service(&repo, drivers, cache).modify_labels(&session, &payload).await?;
    Ok(Json(report))
}

/// List threads of a folder
#[openapi(tag = "Mail")]
#[get("/threads?<folder>&<page_token>")]
pub async fn list_threads(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    folder: Option<FolderParam>,
    page_token: Option<String>,
) -> Result<Json<ThreadPage>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let folder = folder.map(Folder::from).unwrap_or(Folder::Inbox);
    let page = service(&repo, drivers, cache).list_threads(&session, folder, page_token).await?;
    Ok(Json(page))
}

/// Get a thread with its parsed messages
#[openapi(tag = "Mail")]
#[get("/threads/<id>")]
pub async fn get_thread(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
    id: &str,
) -> Result<Json<ThreadDetail>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let thread = service(&repo, drivers, cache).get_thread(&session, id).await?;
    Ok(Json(thread))
}

/// Total and unread counts per folder
#[openapi(tag = "Mail")]
#[get("/stats")]
pub async fn stats(
    pool: &State<PgPool>,
    drivers: &State<ProviderDriverFactory>,
    cache: &State<Arc<ViewCache>>,
    _rate_limit: RateLimit,
    session: Session,
) -> Result<Json<Vec<FolderCount>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let counts = service(&repo, drivers, cache).stats(&session).await?;
    Ok(Json(counts))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![mark_as_read, mark_as_unread, move_threads, modify_labels, list_threads, get_thread, stats]
}
