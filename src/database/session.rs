use crate::auth::Session;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use uuid::Uuid;

impl PostgresRepository {
    pub async fn get_active_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT s.id AS session_id, u.id AS user_id, u.email, s.active_connection_id AS connection_id
            FROM user_session s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
              AND s.user_id = $2
              AND s.expires_at > now()
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn delete_session_if_expired(&self, session_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_session WHERE id = $1 AND expires_at <= now()")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
