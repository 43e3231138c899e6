use crate::config::GoogleProviderConfig;
use crate::driver::{MailDriver, is_fatal_error};
use crate::error::app_error::AppError;
use crate::models::connection::DriverCredentials;
use crate::models::mail::{Attachment, Folder, FolderCount, LABEL_UNREAD, ParsedMessage, ThreadDetail, ThreadPage, ThreadSummary};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Archived threads carry no folder label, so they are found by exclusion.
const ARCHIVE_QUERY: &str = "-in:inbox -in:spam -in:trash -in:sent -in:drafts";

/// Gmail REST driver. Requests retry once with a refreshed token on 401.
pub struct GoogleDriver {
    http: reqwest::Client,
    config: GoogleProviderConfig,
    credentials: DriverCredentials,
    access_token: Mutex<String>,
    refreshed: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadList {
    threads: Option<Vec<ThreadRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailThread {
    id: String,
    messages: Option<Vec<GmailMessage>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: String,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    filename: Option<String>,
    headers: Option<Vec<MessageHeader>>,
    body: Option<PartBody>,
    parts: Option<Vec<MessagePart>>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    size: Option<u64>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelInfo {
    threads_total: Option<u64>,
    threads_unread: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [String],
    remove_label_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
}

impl GoogleDriver {
    pub fn new(http: reqwest::Client, config: GoogleProviderConfig, credentials: DriverCredentials) -> Self {
        let access_token = Mutex::new(credentials.access_token.clone());
        Self {
            http,
            config,
            credentials,
            access_token,
            refreshed: Mutex::new(None),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AppError> {
        endpoint(&self.config.api_base_url, segments)
    }

    fn current_token(&self) -> String {
        self.access_token.lock().map(|token| token.clone()).unwrap_or_default()
    }

    async fn refresh_access_token(&self) -> Result<String, AppError> {
        debug!(email = %self.credentials.email, "refreshing google access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(token_error) = serde_json::from_str::<TokenError>(&body)
                && is_fatal_error(&token_error.error)
            {
                warn!(email = %self.credentials.email, error = %token_error.error, "google connection revoked");
                return Err(AppError::ConnectionRevoked);
            }
            return Err(AppError::provider(format!("token refresh failed with {}", status)));
        }

        let token = response.json::<TokenResponse>().await?.access_token;
        if let Ok(mut current) = self.access_token.lock() {
            *current = token.clone();
        }
        if let Ok(mut refreshed) = self.refreshed.lock() {
            *refreshed = Some(token.clone());
        }
        Ok(token)
    }

    async fn send<T, F>(&self, build: F) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let mut response = build(&self.current_token()).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_access_token().await?;
            response = build(&token).send().await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(AppError::provider(format!("gmail returned {}: {}", status, preview)));
        }

        Ok(response.json::<T>().await?)
    }

    async fn fetch_thread(&self, thread_id: &str, format: &str) -> Result<GmailThread, AppError> {
        let url = self.url(&["threads", thread_id])?;
        self.send(|token| {
            let mut request = self.http.get(url.clone()).bearer_auth(token).query(&[("format", format)]);
            if format == "metadata" {
                request = request.query(&[("metadataHeaders", "Subject"), ("metadataHeaders", "From"), ("metadataHeaders", "Date")]);
            }
            request
        })
        .await
    }

    async fn modify_thread(&self, thread_id: &str, add: &[String], remove: &[String]) -> Result<(), AppError> {
        let url = self.url(&["threads", thread_id, "modify"])?;
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };
        self.send::<IgnoredAny, _>(|token| self.http.post(url.clone()).bearer_auth(token).json(&body)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MailDriver for GoogleDriver {
    async fn list_threads(&self, folder: Folder, page_token: Option<&str>) -> Result<ThreadPage, AppError> {
        let url = self.url(&["threads"])?;
        let page_size = self.config.page_size.to_string();
        let list: ThreadList = self
            .send(|token| {
                let mut request = self.http.get(url.clone()).bearer_auth(token).query(&[("maxResults", page_size.as_str())]);
                request = match folder.label() {
                    Some(label) => request.query(&[("labelIds", label)]),
                    None => request.query(&[("q", ARCHIVE_QUERY)]),
                };
                if let Some(page_token) = page_token {
                    request = request.query(&[("pageToken", page_token)]);
                }
                request
            })
            .await?;

        let mut threads = Vec::new();
        for thread_ref in list.threads.unwrap_or_default() {
            let thread = self.fetch_thread(&thread_ref.id, "metadata").await?;
            threads.push(summarize_thread(&thread));
        }

        Ok(ThreadPage {
            threads,
            next_page_token: list.next_page_token,
        })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ThreadDetail, AppError> {
        let thread = self.fetch_thread(thread_id, "full").await?;
        let messages: Vec<ParsedMessage> = thread.messages.iter().flatten().map(parse_message).collect();
        let has_unread = messages.iter().any(|m| m.unread);
        Ok(ThreadDetail {
            id: thread.id,
            messages,
            has_unread,
        })
    }

    async fn count(&self) -> Result<Vec<FolderCount>, AppError> {
        let mut counts = Vec::new();
        for folder in Folder::ALL {
            let Some(label) = folder.label() else {
                continue;
            };
            let url = self.url(&["labels", label])?;
            let info: LabelInfo = self.send(|token| self.http.get(url.clone()).bearer_auth(token)).await?;
            counts.push(FolderCount {
                folder,
                total: info.threads_total.unwrap_or(0),
                unread: info.threads_unread.unwrap_or(0),
            });
        }
        Ok(counts)
    }

    async fn mark_as_read(&self, thread_ids: &[String]) -> Result<(), AppError> {
        self.modify_labels(thread_ids, &[], &[LABEL_UNREAD.to_string()]).await
    }

    async fn mark_as_unread(&self, thread_ids: &[String]) -> Result<(), AppError> {
        self.modify_labels(thread_ids, &[LABEL_UNREAD.to_string()], &[]).await
    }

    async fn modify_labels(&self, thread_ids: &[String], add: &[String], remove: &[String]) -> Result<(), AppError> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }
        for thread_id in thread_ids {
            self.modify_thread(thread_id, add, remove).await?;
        }
        Ok(())
    }

    fn refreshed_access_token(&self) -> Option<String> {
        self.refreshed.lock().ok().and_then(|token| token.clone())
    }
}

/// Appends `segments` to the API base, percent-encoding each one so ids cannot
/// escape their path segment.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, AppError> {
    let mut url = Url::parse(base).map_err(|e| AppError::provider(format!("invalid gmail api base url: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| AppError::provider("gmail api base url cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .as_ref()?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn find_body(part: &MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type)
        && let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref())
    {
        return decode_body(data);
    }
    part.parts.iter().flatten().find_map(|child| find_body(child, mime_type))
}

fn collect_attachments(part: &MessagePart, out: &mut Vec<Attachment>) {
    if let (Some(filename), Some(body)) = (part.filename.as_deref().filter(|f| !f.is_empty()), part.body.as_ref())
        && let Some(attachment_id) = body.attachment_id.as_ref()
    {
        out.push(Attachment {
            attachment_id: attachment_id.clone(),
            filename: filename.to_string(),
            mime_type: part.mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
            size: body.size.unwrap_or(0),
        });
    }
    for child in part.parts.iter().flatten() {
        collect_attachments(child, out);
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn received_on(message: &GmailMessage) -> Option<DateTime<Utc>> {
    let millis = message.internal_date.as_deref()?.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn is_unread(message: &GmailMessage) -> bool {
    message.label_ids.iter().flatten().any(|label| label == LABEL_UNREAD)
}

fn parse_message(message: &GmailMessage) -> ParsedMessage {
    let empty = MessagePart::default();
    let payload = message.payload.as_ref().unwrap_or(&empty);

    let body_html = find_body(payload, "text/html")
        .or_else(|| find_body(payload, "text/plain").map(|text| format!("<pre>{}</pre>", escape_html(&text))))
        .unwrap_or_default();

    let mut attachments = Vec::new();
    collect_attachments(payload, &mut attachments);

    ParsedMessage {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        subject: header(payload, "Subject").unwrap_or_default().to_string(),
        sender: header(payload, "From").unwrap_or_default().to_string(),
        to: header(payload, "To")
            .map(|to| to.split(',').map(|addr| addr.trim().to_string()).filter(|a| !a.is_empty()).collect())
            .unwrap_or_default(),
        unread: is_unread(message),
        tags: message.label_ids.clone().unwrap_or_default(),
        received_on: received_on(message),
        body_html,
        attachments,
    }
}

fn summarize_thread(thread: &GmailThread) -> ThreadSummary {
    let messages = thread.messages.as_deref().unwrap_or_default();
    let first_payload = messages.first().and_then(|m| m.payload.as_ref());
    let latest = messages.last();

    let mut labels: Vec<String> = Vec::new();
    for label in messages.iter().flat_map(|m| m.label_ids.iter().flatten()) {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    ThreadSummary {
        id: thread.id.clone(),
        subject: first_payload.and_then(|p| header(p, "Subject")).unwrap_or_default().to_string(),
        sender: latest
            .and_then(|m| m.payload.as_ref())
            .and_then(|p| header(p, "From"))
            .unwrap_or_default()
            .to_string(),
        snippet: latest.and_then(|m| m.snippet.clone()).unwrap_or_default(),
        unread: messages.iter().any(is_unread),
        labels,
        received_on: latest.and_then(received_on),
    }
}
