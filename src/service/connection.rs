use crate::auth::Session;
use crate::database::connection::ConnectionRepository;
use crate::driver::{DriverFactory, MailDriver};
use crate::error::app_error::AppError;
use crate::models::connection::{Connection, ConnectionResponse};
use crate::service::cache::ViewCache;
use tracing::{info, warn};
use uuid::Uuid;

/// A driver bound to the connection it was built from.
pub struct ActiveDriver {
    pub connection_id: Uuid,
    pub driver: Box<dyn MailDriver>,
}

pub struct ConnectionService<'a> {
    repository: &'a dyn ConnectionRepository,
    drivers: &'a dyn DriverFactory,
    cache: &'a ViewCache,
}

impl<'a> ConnectionService<'a> {
    pub fn new(repository: &'a dyn ConnectionRepository, drivers: &'a dyn DriverFactory, cache: &'a ViewCache) -> Self {
        Self { repository, drivers, cache }
    }

    pub async fn get_active_connection(&self, session: &Session) -> Result<Connection, AppError> {
        let connection_id = session.require_connection()?;
        match self.repository.get_connection(&session.user_id, &connection_id).await? {
            Some(connection) => Ok(connection),
            None => {
                warn!(user_id = %session.user_id, connection_id = %connection_id, "active connection not found");
                Err(AppError::Unauthorized)
            }
        }
    }

    /// Builds a driver for the session's active connection. Reads only.
    pub async fn resolve_active_driver(&self, session: &Session) -> Result<ActiveDriver, AppError> {
        let connection = self.get_active_connection(session).await?;
        let Some(credentials) = connection.credentials() else {
            warn!(user_id = %session.user_id, connection_id = %connection.id, "connection is missing credentials");
            return Err(AppError::Unauthorized);
        };

        let driver = self.drivers.create_driver(&connection.provider_id, credentials)?;
        Ok(ActiveDriver {
            connection_id: connection.id,
            driver,
        })
    }

    /// Stores a token the driver refreshed, so the next request starts with it.
    pub async fn persist_refreshed_token(&self, session: &Session, active: &ActiveDriver) {
        let Some(token) = active.driver.refreshed_access_token() else {
            return;
        };
        if let Err(err) = self.repository.update_access_token(&session.user_id, &active.connection_id, &token).await {
            warn!(error = %err, connection_id = %active.connection_id, "failed to store refreshed access token");
        }
    }

    pub async fn delete_active_connection(&self, session: &Session) -> Result<(), AppError> {
        let connection_id = session.require_connection()?;
        let deleted = self.repository.delete_connection(&session.user_id, &connection_id).await?;
        if deleted == 0 {
            return Err(AppError::NotFound("Connection not found".to_string()));
        }

        let evicted = self.cache.evict_connection(connection_id).await;
        info!(user_id = %session.user_id, connection_id = %connection_id, evicted, "deleted active connection");
        Ok(())
    }

    pub async fn list_connections(&self, session: &Session) -> Result<Vec<ConnectionResponse>, AppError> {
        let connections = self.repository.list_connections(&session.user_id).await?;
        Ok(connections
            .iter()
            .map(|connection| ConnectionResponse::from_connection(connection, session.connection_id))
            .collect())
    }

    pub async fn set_active_connection(&self, session: &Session, connection_id: &Uuid) -> Result<ConnectionResponse, AppError> {
        let Some(connection) = self.repository.get_connection(&session.user_id, connection_id).await? else {
            return Err(AppError::NotFound("Connection not found".to_string()));
        };
        self.repository.set_active_connection(&session.session_id, &session.user_id, connection_id).await?;
        Ok(ConnectionResponse::from_connection(&connection, Some(connection.id)))
    }
}
