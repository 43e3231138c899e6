use crate::auth::Session;
use crate::database::settings::SettingsRepository;
use crate::error::app_error::AppError;
use crate::models::settings::{SettingsResponse, UserSettings, UserSettingsRow};
use tracing::info;

pub struct SettingsService<'a> {
    repository: &'a dyn SettingsRepository,
}

impl<'a> SettingsService<'a> {
    pub fn new(repository: &'a dyn SettingsRepository) -> Self {
        Self { repository }
    }

    /// Validates `candidate` and stores it as the user's settings document.
    ///
    /// Nothing is written unless the whole document passes validation.
    pub async fn save_user_settings(&self, session: &Session, candidate: serde_json::Value) -> Result<UserSettingsRow, AppError> {
        let settings = UserSettings::from_candidate(candidate)?;
        let row = self.repository.upsert_user_settings(&session.user_id, &settings).await?;
        info!(user_id = %session.user_id, settings_id = %row.id, "user settings saved");
        Ok(row)
    }

    pub async fn get_user_settings(&self, session: &Session) -> Result<SettingsResponse, AppError> {
        Ok(match self.repository.get_user_settings(&session.user_id).await? {
            Some(row) => SettingsResponse::from(&row),
            None => SettingsResponse::defaults(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::SETTINGS_SCHEMA_VERSION;
    use crate::test_utils::{MockRepository, sample_session};
    use serde_json::json;

    #[tokio::test]
    async fn first_save_inserts_and_second_updates_same_row() {
        let repo = MockRepository::default();
        let service = SettingsService::new(&repo);
        let session = sample_session();

        let first = service.save_user_settings(&session, json!({ "language": "fr" })).await.unwrap();
        let second = service
            .save_user_settings(&session, json!({ "language": "de", "is_onboarded": true }))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.settings.0.language, "de");
        assert!(second.settings.0.is_onboarded);
        assert_eq!(second.schema_version, SETTINGS_SCHEMA_VERSION);
        assert_eq!(repo.settings_rows().await, 1);
    }

    #[tokio::test]
    async fn unknown_key_is_rejected_without_store_access() {
        let repo = MockRepository::default();
        let service = SettingsService::new(&repo);

        let result = service.save_user_settings(&sample_session(), json!({ "theme": "dark" })).await;

        assert!(matches!(result, Err(AppError::InvalidSettings(_))));
        assert_eq!(repo.store_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_value_is_a_validation_error() {
        let repo = MockRepository::default();
        let service = SettingsService::new(&repo);

        let result = service
            .save_user_settings(&sample_session(), json!({ "trusted_senders": ["not-an-address"] }))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(repo.store_calls(), 0);
    }

    #[tokio::test]
    async fn missing_settings_read_as_defaults() {
        let repo = MockRepository::default();
        let service = SettingsService::new(&repo);

        let response = service.get_user_settings(&sample_session()).await.unwrap();
        assert_eq!(response.settings, UserSettings::default());
        assert!(response.updated_at.is_none());
    }

    #[tokio::test]
    async fn settings_are_scoped_per_user() {
        let repo = MockRepository::default();
        let service = SettingsService::new(&repo);
        let alice = sample_session();
        let bob = sample_session();

        service.save_user_settings(&alice, json!({ "language": "ja" })).await.unwrap();

        let bob_settings = service.get_user_settings(&bob).await.unwrap();
        assert_eq!(bob_settings.settings.language, "en");
        assert_eq!(service.get_user_settings(&alice).await.unwrap().settings.language, "ja");
    }
}
