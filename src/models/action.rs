use schemars::JsonSchema;
use serde::Serialize;

/// Tagged result returned by actions that can be refused without an HTTP error.
#[derive(Serialize, Debug, JsonSchema, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
