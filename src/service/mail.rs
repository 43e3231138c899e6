use crate::auth::Session;
use crate::error::app_error::AppError;
use crate::models::mail::{
    CachedView, Folder, FolderCount, LabelDelta, MarkThreadsRequest, ModifyLabelsRequest, MoveThreadsRequest, MutationReport, ThreadDetail, ThreadPage,
    dedup_ids,
};
use crate::service::cache::{ViewCache, ViewKey};
use crate::service::connection::{ActiveDriver, ConnectionService};
use tracing::{debug, warn};
use validator::Validate;

/// Mail reads and mutations for the session's active connection.
///
/// Every mutation invalidates the affected cached views once the provider call
/// has settled, whether it succeeded or not, so clients re-sync with the
/// provider's state.
pub struct MailService<'a> {
    connections: ConnectionService<'a>,
    cache: &'a ViewCache,
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    Read,
    Unread,
}

impl<'a> MailService<'a> {
    pub fn new(connections: ConnectionService<'a>, cache: &'a ViewCache) -> Self {
        Self { connections, cache }
    }

    pub async fn mark_as_read(&self, session: &Session, request: &MarkThreadsRequest) -> Result<MutationReport, AppError> {
        self.set_read_state(session, request, ReadState::Read).await
    }

    pub async fn mark_as_unread(&self, session: &Session, request: &MarkThreadsRequest) -> Result<MutationReport, AppError> {
        self.set_read_state(session, request, ReadState::Unread).await
    }

    async fn set_read_state(&self, session: &Session, request: &MarkThreadsRequest, state: ReadState) -> Result<MutationReport, AppError> {
        request.validate()?;
        let ids = dedup_ids(&request.ids);

        let active = self.connections.resolve_active_driver(session).await?;
        let result = match state {
            ReadState::Read => active.driver.mark_as_read(&ids).await,
            ReadState::Unread => active.driver.mark_as_unread(&ids).await,
        };

        let mut refresh = vec![CachedView::Threads, CachedView::Stats];
        refresh.extend(ids.iter().cloned().map(CachedView::Thread));
        self.settle(session, &active, result, refresh, ids.len()).await
    }

    pub async fn move_threads_to(&self, session: &Session, request: &MoveThreadsRequest) -> Result<MutationReport, AppError> {
        request.validate()?;
        let ids = dedup_ids(&request.thread_ids);

        let active = self.connections.resolve_active_driver(session).await?;
        let delta = LabelDelta::between(request.current_folder, request.destination);
        let (result, affected) = if delta.is_empty() {
            debug!(folder = request.destination.as_str(), "threads already in destination");
            (Ok(()), 0)
        } else {
            (active.driver.modify_labels(&ids, &delta.add, &delta.remove).await, ids.len())
        };

        let mut refresh = vec![CachedView::Threads, CachedView::Stats];
        refresh.extend(ids.iter().cloned().map(CachedView::Thread));
        self.settle(session, &active, result, refresh, affected).await
    }

    pub async fn modify_labels(&self, session: &Session, request: &ModifyLabelsRequest) -> Result<MutationReport, AppError> {
        request.validate()?;
        let overlap = request.overlapping_labels();
        if !overlap.is_empty() {
            return Err(AppError::BadRequest(format!("labels both added and removed: {}", overlap.join(", "))));
        }
        let ids = dedup_ids(&request.thread_ids);
        let add = dedup_ids(&request.add_labels);
        let remove = dedup_ids(&request.remove_labels);

        let active = self.connections.resolve_active_driver(session).await?;
        let (result, affected) = if add.is_empty() && remove.is_empty() {
            (Ok(()), 0)
        } else {
            (active.driver.modify_labels(&ids, &add, &remove).await, ids.len())
        };

        let mut refresh = vec![CachedView::Threads, CachedView::Stats];
        refresh.extend(ids.iter().cloned().map(CachedView::Thread));
        self.settle(session, &active, result, refresh, affected).await
    }

    async fn settle(
        &self,
        session: &Session,
        active: &ActiveDriver,
        result: Result<(), AppError>,
        refresh: Vec<CachedView>,
        affected: usize,
    ) -> Result<MutationReport, AppError> {
        let invalidated = self.cache.invalidate(active.connection_id, &refresh).await;
        self.connections.persist_refreshed_token(session, active).await;

        match result {
            Ok(()) => {
                debug!(connection_id = %active.connection_id, affected, invalidated, "mail mutation applied");
                Ok(MutationReport {
                    success: true,
                    affected,
                    refresh,
                })
            }
            Err(err) => {
                warn!(connection_id = %active.connection_id, error = %err, invalidated, "mail mutation failed");
                Err(err)
            }
        }
    }

    pub async fn list_threads(&self, session: &Session, folder: Folder, page_token: Option<String>) -> Result<ThreadPage, AppError> {
        let connection_id = session.require_connection()?;
        let key = ViewKey::Threads {
            folder,
            page_token: page_token.clone(),
        };
        if let Some(page) = self.cache.get::<ThreadPage>(connection_id, &key).await {
            return Ok(page);
        }

        let active = self.connections.resolve_active_driver(session).await?;
        let page = active.driver.list_threads(folder, page_token.as_deref()).await;
        self.connections.persist_refreshed_token(session, &active).await;
        let page = page?;
        self.cache.put(active.connection_id, key, &page).await;
        Ok(page)
    }

    pub async fn get_thread(&self, session: &Session, thread_id: &str) -> Result<ThreadDetail, AppError> {
        if thread_id.trim().is_empty() {
            return Err(AppError::BadRequest("thread id is required".to_string()));
        }
        let connection_id = session.require_connection()?;
        let key = ViewKey::Thread(thread_id.to_string());
        if let Some(thread) = self.cache.get::<ThreadDetail>(connection_id, &key).await {
            return Ok(thread);
        }

        let active = self.connections.resolve_active_driver(session).await?;
        let thread = active.driver.get_thread(thread_id).await;
        self.connections.persist_refreshed_token(session, &active).await;
        let thread = thread?;
        self.cache.put(active.connection_id, key, &thread).await;
        Ok(thread)
    }

    pub async fn stats(&self, session: &Session) -> Result<Vec<FolderCount>, AppError> {
        let connection_id = session.require_connection()?;
        if let Some(counts) = self.cache.get::<Vec<FolderCount>>(connection_id, &ViewKey::Stats).await {
            return Ok(counts);
        }

        let active = self.connections.resolve_active_driver(session).await?;
        let counts = active.driver.count().await;
        self.connections.persist_refreshed_token(session, &active).await;
        let counts = counts?;
        self.cache.put(active.connection_id, ViewKey::Stats, &counts).await;
        Ok(counts)
    }
}
