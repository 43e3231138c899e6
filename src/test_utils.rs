use crate::auth::Session;
use crate::database::connection::ConnectionRepository;
use crate::database::early_access::EarlyAccessRepository;
use crate::database::settings::SettingsRepository;
use crate::driver::{DriverFactory, GOOGLE_PROVIDER_ID, MailDriver};
use crate::error::app_error::AppError;
use crate::models::connection::{Connection, DriverCredentials};
use crate::models::early_access::{EarlyAccess, Referrer, normalize_email};
use crate::models::mail::{Folder, FolderCount, ThreadDetail, ThreadPage};
use crate::models::settings::{SETTINGS_SCHEMA_VERSION, UserSettings, UserSettingsRow};
use crate::service::email::{Notification, Notifier};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use uuid::Uuid;

pub fn sample_session() -> Session {
    let user_id = Uuid::new_v4();
    Session {
        session_id: Uuid::new_v4(),
        user_id,
        email: format!("user-{}@example.com", user_id.simple()),
        connection_id: Some(Uuid::new_v4()),
    }
}

/// A fully credentialed Google connection that is `session`'s active one.
pub fn sample_connection(session: &Session) -> Connection {
    let now = Utc::now();
    Connection {
        id: session.connection_id.unwrap_or_else(Uuid::new_v4),
        user_id: session.user_id,
        provider_id: GOOGLE_PROVIDER_ID.to_string(),
        email: session.email.clone(),
        access_token: Some("access-token".to_string()),
        refresh_token: Some("refresh-token".to_string()),
        created_at: now,
        updated_at: now,
    }
}

fn mock_db_error() -> AppError {
    AppError::db("mock store failure", sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
struct MockState {
    connections: Vec<Connection>,
    active: HashMap<Uuid, Uuid>,
    token_updates: Vec<(Uuid, String)>,
    settings: HashMap<Uuid, UserSettingsRow>,
    users: HashMap<Uuid, String>,
    early_access: HashMap<String, EarlyAccess>,
}

/// In-memory store implementing every repository trait.
#[derive(Default)]
pub struct MockRepository {
    state: Mutex<MockState>,
    fail_writes: AtomicBool,
    conflict_on_register: AtomicBool,
    fail_register: AtomicBool,
    store_calls: AtomicUsize,
}

impl MockRepository {
    pub async fn add_connection(&self, connection: Connection) {
        self.state.lock().await.connections.push(connection);
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.state.lock().await.connections.clone()
    }

    pub async fn token_updates(&self) -> Vec<(Uuid, String)> {
        self.state.lock().await.token_updates.clone()
    }

    pub async fn settings_rows(&self) -> usize {
        self.state.lock().await.settings.len()
    }

    pub async fn add_user(&self, user_id: Uuid, email: &str) {
        self.state.lock().await.users.insert(user_id, email.to_string());
    }

    pub async fn add_early_access(&self, email: &str, is_early_access: bool, has_used_ticket: &str) {
        let now = Utc::now();
        self.state.lock().await.early_access.insert(
            email.to_string(),
            EarlyAccess {
                id: Uuid::new_v4(),
                email: email.to_string(),
                is_early_access,
                has_used_ticket: has_used_ticket.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn early_access(&self, email: &str) -> Option<EarlyAccess> {
        self.state.lock().await.early_access.get(email).cloned()
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `register_invitee` report a unique violation.
    pub fn conflict_on_register(&self, conflict: bool) {
        self.conflict_on_register.store(conflict, Ordering::SeqCst);
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    fn touch(&self) {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), AppError> {
        self.touch();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(mock_db_error());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnectionRepository for MockRepository {
    async fn get_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<Option<Connection>, AppError> {
        self.touch();
        let state = self.state.lock().await;
        Ok(state
            .connections
            .iter()
            .find(|c| c.id == *connection_id && c.user_id == *user_id)
            .cloned())
    }

    async fn list_connections(&self, user_id: &Uuid) -> Result<Vec<Connection>, AppError> {
        self.touch();
        let state = self.state.lock().await;
        Ok(state.connections.iter().filter(|c| c.user_id == *user_id).cloned().collect())
    }

    async fn delete_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<u64, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        let before = state.connections.len();
        state.connections.retain(|c| !(c.id == *connection_id && c.user_id == *user_id));
        state.active.retain(|_, active| active != connection_id);
        Ok((before - state.connections.len()) as u64)
    }

    async fn update_access_token(&self, user_id: &Uuid, connection_id: &Uuid, access_token: &str) -> Result<(), AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        if let Some(connection) = state
            .connections
            .iter_mut()
            .find(|c| c.id == *connection_id && c.user_id == *user_id)
        {
            connection.access_token = Some(access_token.to_string());
        }
        state.token_updates.push((*connection_id, access_token.to_string()));
        Ok(())
    }

    async fn set_active_connection(&self, session_id: &Uuid, user_id: &Uuid, connection_id: &Uuid) -> Result<(), AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        if !state.connections.iter().any(|c| c.id == *connection_id && c.user_id == *user_id) {
            return Err(AppError::NotFound("Connection not found".to_string()));
        }
        state.active.insert(*session_id, *connection_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SettingsRepository for MockRepository {
    async fn get_user_settings(&self, user_id: &Uuid) -> Result<Option<UserSettingsRow>, AppError> {
        self.touch();
        Ok(self.state.lock().await.settings.get(user_id).cloned())
    }

    async fn upsert_user_settings(&self, user_id: &Uuid, settings: &UserSettings) -> Result<UserSettingsRow, AppError> {
        self.check_write()?;
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let row = state.settings.entry(*user_id).or_insert_with(|| UserSettingsRow {
            id: Uuid::new_v4(),
            user_id: *user_id,
            settings: sqlx::types::Json(settings.clone()),
            schema_version: SETTINGS_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        });
        row.settings = sqlx::types::Json(settings.clone());
        row.schema_version = SETTINGS_SCHEMA_VERSION;
        // updated_at strictly increases on every save, as with Postgres now() per transaction.
        row.updated_at = now.max(row.updated_at + chrono::Duration::microseconds(1));
        Ok(row.clone())
    }
}

#[async_trait::async_trait]
impl EarlyAccessRepository for MockRepository {
    async fn get_referrer(&self, user_id: &Uuid) -> Result<Option<Referrer>, AppError> {
        self.touch();
        let state = self.state.lock().await;
        Ok(state.users.get(user_id).map(|email| {
            let email = normalize_email(email);
            let record = state.early_access.get(&email);
            Referrer {
                email,
                is_early_access: record.map(|r| r.is_early_access),
                has_used_ticket: record.map(|r| r.has_used_ticket.clone()),
            }
        }))
    }

    async fn get_early_access(&self, email: &str) -> Result<Option<EarlyAccess>, AppError> {
        self.touch();
        Ok(self.state.lock().await.early_access.get(email).cloned())
    }

    async fn claim_ticket(&self, referrer_email: &str, invitee: &str) -> Result<bool, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        match state.early_access.get_mut(referrer_email) {
            Some(record) if record.is_early_access && record.has_used_ticket.is_empty() => {
                record.has_used_ticket = invitee.to_string();
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_ticket(&self, referrer_email: &str, invitee: &str) -> Result<(), AppError> {
        self.touch();
        let mut state = self.state.lock().await;
        if let Some(record) = state.early_access.get_mut(referrer_email) {
            if record.has_used_ticket == invitee {
                record.has_used_ticket.clear();
            }
        }
        Ok(())
    }

    async fn register_invitee(&self, email: &str) -> Result<EarlyAccess, AppError> {
        self.check_write()?;
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(mock_db_error());
        }
        if self.conflict_on_register.load(Ordering::SeqCst) {
            return Err(AppError::Conflict("early_access_email_key".to_string()));
        }
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let record = state.early_access.entry(email.to_string()).or_insert_with(|| EarlyAccess {
            id: Uuid::new_v4(),
            email: email.to_string(),
            is_early_access: true,
            has_used_ticket: String::new(),
            created_at: now,
            updated_at: now,
        });
        record.is_early_access = true;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn grant_early_access(&self, email: &str) -> Result<(), AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        match state.early_access.get_mut(email) {
            Some(record) => {
                record.is_early_access = true;
                record.updated_at = Utc::now();
                Ok(())
            }
            None => Err(AppError::NotFound("Early access record not found".to_string())),
        }
    }

    async fn join_waitlist(&self, email: &str) -> Result<bool, AppError> {
        self.check_write()?;
        let mut state = self.state.lock().await;
        if state.early_access.contains_key(email) {
            return Ok(false);
        }
        let now = Utc::now();
        state.early_access.insert(
            email.to_string(),
            EarlyAccess {
                id: Uuid::new_v4(),
                email: email.to_string(),
                is_early_access: false,
                has_used_ticket: String::new(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    ListThreads(Folder),
    GetThread(String),
    Count,
    MarkAsRead(Vec<String>),
    MarkAsUnread(Vec<String>),
    ModifyLabels {
        thread_ids: Vec<String>,
        add: Vec<String>,
        remove: Vec<String>,
    },
}

#[derive(Default)]
struct DriverLog {
    created: Vec<(String, DriverCredentials)>,
    calls: Vec<DriverCall>,
    fail_mutations: bool,
    refreshed_token: Option<String>,
}

/// Factory whose drivers record every call into a shared log.
#[derive(Default, Clone)]
pub struct MockDriverFactory {
    log: Arc<StdMutex<DriverLog>>,
}

impl MockDriverFactory {
    pub fn created(&self) -> Vec<(String, DriverCredentials)> {
        self.log.lock().unwrap().created.clone()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.log.lock().unwrap().fail_mutations = fail;
    }

    /// Makes drivers report `token` as refreshed during their lifetime.
    pub fn refresh_token_to(&self, token: &str) {
        self.log.lock().unwrap().refreshed_token = Some(token.to_string());
    }
}

impl DriverFactory for MockDriverFactory {
    fn create_driver(&self, provider_id: &str, credentials: DriverCredentials) -> Result<Box<dyn MailDriver>, AppError> {
        if provider_id != GOOGLE_PROVIDER_ID {
            return Err(AppError::UnsupportedProvider(provider_id.to_string()));
        }
        self.log.lock().unwrap().created.push((provider_id.to_string(), credentials));
        Ok(Box::new(MockDriver { log: self.log.clone() }))
    }
}

struct MockDriver {
    log: Arc<StdMutex<DriverLog>>,
}

impl MockDriver {
    fn record(&self, call: DriverCall) {
        self.log.lock().unwrap().calls.push(call);
    }

    fn record_mutation(&self, call: DriverCall) -> Result<(), AppError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_mutations {
            return Err(AppError::provider("mock provider rejected the request"));
        }
        log.calls.push(call);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MailDriver for MockDriver {
    async fn list_threads(&self, folder: Folder, _page_token: Option<&str>) -> Result<ThreadPage, AppError> {
        self.record(DriverCall::ListThreads(folder));
        Ok(ThreadPage {
            threads: vec![],
            next_page_token: None,
        })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ThreadDetail, AppError> {
        self.record(DriverCall::GetThread(thread_id.to_string()));
        Ok(ThreadDetail {
            id: thread_id.to_string(),
            messages: vec![],
            has_unread: false,
        })
    }

    async fn count(&self) -> Result<Vec<FolderCount>, AppError> {
        self.record(DriverCall::Count);
        Ok(Folder::ALL
            .iter()
            .map(|folder| FolderCount {
                folder: *folder,
                total: 0,
                unread: 0,
            })
            .collect())
    }

    async fn mark_as_read(&self, thread_ids: &[String]) -> Result<(), AppError> {
        self.record_mutation(DriverCall::MarkAsRead(thread_ids.to_vec()))
    }

    async fn mark_as_unread(&self, thread_ids: &[String]) -> Result<(), AppError> {
        self.record_mutation(DriverCall::MarkAsUnread(thread_ids.to_vec()))
    }

    async fn modify_labels(&self, thread_ids: &[String], add: &[String], remove: &[String]) -> Result<(), AppError> {
        self.record_mutation(DriverCall::ModifyLabels {
            thread_ids: thread_ids.to_vec(),
            add: add.to_vec(),
            remove: remove.to_vec(),
        })
    }

    fn refreshed_access_token(&self) -> Option<String> {
        self.log.lock().unwrap().refreshed_token.clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: StdMutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: StdMutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::email("mock smtp failure"));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
