use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EarlyAccess {
    pub id: Uuid,
    pub email: String,
    pub is_early_access: bool,
    /// Email of the invitee this record's ticket went to; empty while unused.
    pub has_used_ticket: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user joined with their (possibly missing) early-access record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Referrer {
    pub email: String,
    pub is_early_access: Option<bool>,
    pub has_used_ticket: Option<String>,
}

impl Referrer {
    pub fn has_used_ticket(&self) -> bool {
        self.has_used_ticket.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_early_access(&self) -> bool {
        self.is_early_access.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EarlyAccessState {
    Unregistered,
    Waitlisted,
    EarlyAccessUnclaimed,
    TicketClaimed,
}

impl EarlyAccessState {
    pub fn of(record: Option<&EarlyAccess>) -> Self {
        match record {
            None => EarlyAccessState::Unregistered,
            Some(r) if !r.is_early_access => EarlyAccessState::Waitlisted,
            Some(r) if r.has_used_ticket.is_empty() => EarlyAccessState::EarlyAccessUnclaimed,
            Some(_) => EarlyAccessState::TicketClaimed,
        }
    }
}

/// Why a golden ticket could not be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketRejection {
    UserNotFound,
    AlreadyClaimed,
    NotEligible,
}

impl TicketRejection {
    pub fn message(self) -> &'static str {
        match self {
            TicketRejection::UserNotFound => "User not found",
            TicketRejection::AlreadyClaimed => "Golden ticket already claimed",
            TicketRejection::NotEligible => "Unauthorized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketOutcome {
    Claimed,
    Rejected(TicketRejection),
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct EmailRequest {
    #[validate(email, length(max = 320))]
    pub email: String,
}

impl EmailRequest {
    /// Addresses are compared trimmed and lowercased.
    pub fn normalized(&self) -> Self {
        Self {
            email: normalize_email(&self.email),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct EarlyAccessStatusResponse {
    pub email: String,
    pub state: EarlyAccessState,
    pub is_early_access: bool,
    pub ticket_available: bool,
}

impl EarlyAccessStatusResponse {
    pub fn new(email: &str, record: Option<&EarlyAccess>) -> Self {
        let state = EarlyAccessState::of(record);
        Self {
            email: email.to_string(),
            state,
            is_early_access: record.is_some_and(|r| r.is_early_access),
            ticket_available: state == EarlyAccessState::EarlyAccessUnclaimed,
        }
    }
}
