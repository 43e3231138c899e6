use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::settings::{SETTINGS_SCHEMA_VERSION, UserSettings, UserSettingsRow};
use sqlx::types::Json;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_user_settings(&self, user_id: &Uuid) -> Result<Option<UserSettingsRow>, AppError>;
    /// Inserts the user's single settings row or replaces its document in place.
    async fn upsert_user_settings(&self, user_id: &Uuid, settings: &UserSettings) -> Result<UserSettingsRow, AppError>;
}

#[async_trait::async_trait]
impl SettingsRepository for PostgresRepository {
    async fn get_user_settings(&self, user_id: &Uuid) -> Result<Option<UserSettingsRow>, AppError> {
        let row = sqlx::query_as::<_, UserSettingsRow>(
            r#"
            SELECT id, user_id, settings, schema_version, created_at, updated_at
            FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert_user_settings(&self, user_id: &Uuid, settings: &UserSettings) -> Result<UserSettingsRow, AppError> {
        let row = sqlx::query_as::<_, UserSettingsRow>(
            r#"
            INSERT INTO user_settings (user_id, settings, schema_version)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET
                settings = EXCLUDED.settings,
                schema_version = EXCLUDED.schema_version,
                updated_at = now()
            RETURNING id, user_id, settings, schema_version, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(Json(settings))
        .bind(SETTINGS_SCHEMA_VERSION)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::postgres_repository::testing;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn upsert_keeps_row_identity() {
        let repo = testing::repository().await;
        let (user_id, _) = testing::insert_user(&repo).await;

        let first = repo.upsert_user_settings(&user_id, &UserSettings::default()).await.unwrap();
        let updated = UserSettings {
            language: "pt".to_string(),
            ..UserSettings::default()
        };
        let second = repo.upsert_user_settings(&user_id, &updated).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        let stored = repo.get_user_settings(&user_id).await.unwrap().unwrap();
        assert_eq!(stored.settings.0.language, "pt");
    }
}
