use crate::error::app_error::AppError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

pub const SETTINGS_SCHEMA_VERSION: i32 = 1;

const SUPPORTED_LANGUAGES: [&str; 7] = ["en", "es", "pt", "fr", "de", "ja", "zh"];

/// The recognized settings document. Unknown keys are a schema mismatch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Validate, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct UserSettings {
    #[validate(custom(function = "validate_language"))]
    pub language: String,

    #[validate(custom(function = "validate_timezone"))]
    pub timezone: String,

    pub dynamic_content: bool,

    pub external_images: bool,

    #[validate(length(max = 3000))]
    pub custom_prompt: String,

    #[validate(length(max = 500), custom(function = "validate_trusted_senders"))]
    pub trusted_senders: Vec<String>,

    pub is_onboarded: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            timezone: "UTC".to_string(),
            dynamic_content: false,
            external_images: true,
            custom_prompt: String::new(),
            trusted_senders: Vec::new(),
            is_onboarded: false,
        }
    }
}

impl UserSettings {
    /// Parses and validates an untrusted settings candidate.
    pub fn from_candidate(candidate: serde_json::Value) -> Result<Self, AppError> {
        if !candidate.is_object() {
            return Err(AppError::InvalidSettings("settings must be a JSON object".to_string()));
        }
        let settings: UserSettings = serde_json::from_value(candidate).map_err(|e| AppError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSettingsRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub settings: sqlx::types::Json<UserSettings>,
    pub schema_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SettingsResponse {
    pub settings: UserSettings,
    pub schema_version: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&UserSettingsRow> for SettingsResponse {
    fn from(row: &UserSettingsRow) -> Self {
        Self {
            settings: row.settings.0.clone(),
            schema_version: row.schema_version,
            updated_at: Some(row.updated_at),
        }
    }
}

impl SettingsResponse {
    pub fn defaults() -> Self {
        Self {
            settings: UserSettings::default(),
            schema_version: SETTINGS_SCHEMA_VERSION,
            updated_at: None,
        }
    }
}

fn validate_language(language: &str) -> Result<(), ValidationError> {
    if SUPPORTED_LANGUAGES.contains(&language) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_language"))
    }
}

fn validate_timezone(tz: &str) -> Result<(), ValidationError> {
    if tz.parse::<chrono_tz::Tz>().is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_timezone"))
    }
}

fn validate_trusted_senders(senders: &[String]) -> Result<(), ValidationError> {
    if senders.iter().all(|sender| sender.validate_email()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_trusted_sender"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_take_defaults() {
        let settings = UserSettings::from_candidate(json!({"language": "fr"})).unwrap();
        assert_eq!(settings.language, "fr");
        assert_eq!(settings.timezone, "UTC");
        assert!(settings.external_images);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = UserSettings::from_candidate(json!({"language": "en", "colour": "blue"})).unwrap_err();
        assert!(matches!(err, AppError::InvalidSettings(message) if message.contains("colour")));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = UserSettings::from_candidate(json!({"dynamic_content": "yes"})).unwrap_err();
        assert!(matches!(err, AppError::InvalidSettings(_)));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(UserSettings::from_candidate(json!([1, 2])), Err(AppError::InvalidSettings(_))));
    }

    #[test]
    fn invalid_timezone_fails_validation() {
        let err = UserSettings::from_candidate(json!({"timezone": "Mars/Olympus"})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn trusted_senders_must_be_emails() {
        assert!(UserSettings::from_candidate(json!({"trusted_senders": ["friend@example.com"]})).is_ok());
        let err = UserSettings::from_candidate(json!({"trusted_senders": ["not-an-email"]})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn unsupported_language_fails_validation() {
        assert!(matches!(UserSettings::from_candidate(json!({"language": "xx"})), Err(AppError::Validation(_))));
    }
}
