use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: String,
    pub email: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential pair handed to a driver factory. Only built when both tokens exist.
#[derive(Clone, PartialEq, Eq)]
pub struct DriverCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub email: String,
}

impl std::fmt::Debug for DriverCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCredentials")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("email", &self.email)
            .finish()
    }
}

impl Connection {
    pub fn credentials(&self) -> Option<DriverCredentials> {
        let access_token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.as_deref().filter(|t| !t.is_empty())?;
        Some(DriverCredentials {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            email: self.email.clone(),
        })
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct ConnectionResponse {
    pub id: Uuid,
    pub provider_id: String,
    pub email: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ConnectionResponse {
    pub fn from_connection(connection: &Connection, active_id: Option<Uuid>) -> Self {
        Self {
            id: connection.id,
            provider_id: connection.provider_id.clone(),
            email: connection.email.clone(),
            active: active_id == Some(connection.id),
            created_at: connection.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(access: Option<&str>, refresh: Option<&str>) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider_id: "google".to_string(),
            email: "me@example.com".to_string(),
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn credentials_require_both_tokens() {
        assert!(connection(Some("a"), Some("r")).credentials().is_some());
        assert!(connection(Some("a"), None).credentials().is_none());
        assert!(connection(None, Some("r")).credentials().is_none());
        assert!(connection(Some(""), Some("r")).credentials().is_none());
    }

    #[test]
    fn credentials_debug_masks_tokens() {
        let creds = connection(Some("secret-access"), Some("secret-refresh")).credentials().unwrap();
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("me@example.com"));
    }
}
