pub mod google;

use crate::config::GoogleProviderConfig;
use crate::error::app_error::AppError;
use crate::models::connection::DriverCredentials;
use crate::models::mail::{Folder, FolderCount, ThreadDetail, ThreadPage};
use google::GoogleDriver;

pub const GOOGLE_PROVIDER_ID: &str = "google";

/// Refresh failures after which a connection can never be used again.
pub const FATAL_ERRORS: [&str; 1] = ["invalid_grant"];

/// Mail operations over one linked account.
///
/// Label changes are idempotent: adding a label a thread already carries, or
/// removing one it lacks, succeeds without effect.
#[async_trait::async_trait]
pub trait MailDriver: Send + Sync {
    async fn list_threads(&self, folder: Folder, page_token: Option<&str>) -> Result<ThreadPage, AppError>;
    async fn get_thread(&self, thread_id: &str) -> Result<ThreadDetail, AppError>;
    async fn count(&self) -> Result<Vec<FolderCount>, AppError>;
    async fn mark_as_read(&self, thread_ids: &[String]) -> Result<(), AppError>;
    async fn mark_as_unread(&self, thread_ids: &[String]) -> Result<(), AppError>;
    async fn modify_labels(&self, thread_ids: &[String], add: &[String], remove: &[String]) -> Result<(), AppError>;

    /// Access token obtained by refreshing during this driver's lifetime, if any.
    fn refreshed_access_token(&self) -> Option<String> {
        None
    }
}

pub trait DriverFactory: Send + Sync {
    fn create_driver(&self, provider_id: &str, credentials: DriverCredentials) -> Result<Box<dyn MailDriver>, AppError>;
}

pub struct ProviderDriverFactory {
    http: reqwest::Client,
    google: GoogleProviderConfig,
}

impl ProviderDriverFactory {
    pub fn new(google: GoogleProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            google,
        }
    }
}

impl DriverFactory for ProviderDriverFactory {
    fn create_driver(&self, provider_id: &str, credentials: DriverCredentials) -> Result<Box<dyn MailDriver>, AppError> {
        match provider_id {
            GOOGLE_PROVIDER_ID => Ok(Box::new(GoogleDriver::new(self.http.clone(), self.google.clone(), credentials))),
            other => Err(AppError::UnsupportedProvider(other.to_string())),
        }
    }
}

pub fn is_fatal_error(code: &str) -> bool {
    FATAL_ERRORS.contains(&code)
}
