use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

static LABEL_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-/ ]+$").expect("label id pattern"));

pub const LABEL_UNREAD: &str = "UNREAD";

/// Folders a thread can be moved between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    Inbox,
    Archive,
    Spam,
    Bin,
}

impl Folder {
    pub const ALL: [Folder; 4] = [Folder::Inbox, Folder::Archive, Folder::Spam, Folder::Bin];

    /// Provider label that marks membership; archived threads carry none.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Folder::Inbox => Some("INBOX"),
            Folder::Archive => None,
            Folder::Spam => Some("SPAM"),
            Folder::Bin => Some("TRASH"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Folder::Inbox => "inbox",
            Folder::Archive => "archive",
            Folder::Spam => "spam",
            Folder::Bin => "bin",
        }
    }
}

/// Label changes that move threads from one folder to another.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelDelta {
    pub fn between(current: Folder, destination: Folder) -> Self {
        if current == destination {
            return Self::default();
        }
        Self {
            add: destination.label().map(str::to_string).into_iter().collect(),
            remove: current.label().map(str::to_string).into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Collapses repeated ids while keeping first-seen order.
pub fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

fn validate_ids(ids: &[String]) -> Result<(), ValidationError> {
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(ValidationError::new("blank_id"));
    }
    Ok(())
}

fn validate_label_ids(labels: &[String]) -> Result<(), ValidationError> {
    if labels.iter().all(|label| LABEL_ID.is_match(label)) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_label_id"))
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct MarkThreadsRequest {
    #[validate(length(min = 1, max = 500), custom(function = "validate_ids"))]
    pub ids: Vec<String>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct MoveThreadsRequest {
    #[validate(length(min = 1, max = 500), custom(function = "validate_ids"))]
    pub thread_ids: Vec<String>,
    pub current_folder: Folder,
    pub destination: Folder,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ModifyLabelsRequest {
    #[validate(length(min = 1, max = 500), custom(function = "validate_ids"))]
    pub thread_ids: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_label_ids"))]
    pub add_labels: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_label_ids"))]
    pub remove_labels: Vec<String>,
}

impl ModifyLabelsRequest {
    /// Labels named in both the add and the remove set.
    pub fn overlapping_labels(&self) -> Vec<&str> {
        self.add_labels
            .iter()
            .filter(|label| self.remove_labels.contains(label))
            .map(String::as_str)
            .collect()
    }
}

/// A view the client keeps cached and must refetch after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(tag = "view", content = "id", rename_all = "lowercase")]
pub enum CachedView {
    Threads,
    Thread(String),
    Stats,
}

/// Result of a mail mutation: what changed and which views to refetch.
#[derive(Serialize, Debug, JsonSchema)]
pub struct MutationReport {
    pub success: bool,
    pub affected: usize,
    pub refresh: Vec<CachedView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ThreadSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub unread: bool,
    pub labels: Vec<String>,
    pub received_on: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ThreadPage {
    pub threads: Vec<ThreadSummary>,
    pub next_page_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct Attachment {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// One message of a thread, as rendered by the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ParsedMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub to: Vec<String>,
    pub unread: bool,
    pub tags: Vec<String>,
    pub received_on: Option<DateTime<Utc>>,
    pub body_html: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ThreadDetail {
    pub id: String,
    pub messages: Vec<ParsedMessage>,
    pub has_unread: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct FolderCount {
    pub folder: Folder,
    pub total: u64,
    pub unread: u64,
}
