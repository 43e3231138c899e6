use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::connection::Connection;
use uuid::Uuid;

/// Every query is scoped by the owning user id; no method reaches another user's rows.
#[async_trait::async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn get_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<Option<Connection>, AppError>;
    async fn list_connections(&self, user_id: &Uuid) -> Result<Vec<Connection>, AppError>;
    async fn delete_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<u64, AppError>;
    async fn update_access_token(&self, user_id: &Uuid, connection_id: &Uuid, access_token: &str) -> Result<(), AppError>;
    async fn set_active_connection(&self, session_id: &Uuid, user_id: &Uuid, connection_id: &Uuid) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl ConnectionRepository for PostgresRepository {
    async fn get_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<Option<Connection>, AppError> {
        let connection = sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, user_id, provider_id, email, access_token, refresh_token, created_at, updated_at
            FROM mail_connection
            WHERE user_id = $1 AND id = $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    async fn list_connections(&self, user_id: &Uuid) -> Result<Vec<Connection>, AppError> {
        let connections = sqlx::query_as::<_, Connection>(
            r#"
            SELECT id, user_id, provider_id, email, access_token, refresh_token, created_at, updated_at
            FROM mail_connection
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(connections)
    }

    async fn delete_connection(&self, user_id: &Uuid, connection_id: &Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM mail_connection WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(connection_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_access_token(&self, user_id: &Uuid, connection_id: &Uuid, access_token: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE mail_connection
            SET access_token = $3, updated_at = now()
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(connection_id)
        .bind(access_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_active_connection(&self, session_id: &Uuid, user_id: &Uuid, connection_id: &Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_session
            SET active_connection_id = $3
            WHERE id = $1
              AND user_id = $2
              AND EXISTS (SELECT 1 FROM mail_connection c WHERE c.id = $3 AND c.user_id = $2)
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Connection not found".to_string()));
        }

        Ok(())
    }
}
