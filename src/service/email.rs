use crate::config::EmailConfig;
use crate::error::app_error::AppError;
use lettre::message::header::ContentType;
use lettre::message::{MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// An outbound message with plain-text and HTML bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), AppError>;
}

pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn app_url(&self) -> &str {
        &self.config.app_url
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, AppError> {
        Message::builder()
            .from(
                format!("{} <{}>", self.config.from_name, self.config.from_address)
                    .parse()
                    .map_err(|e| AppError::email(format!("Invalid from address: {}", e)))?,
            )
            .to(notification
                .to
                .parse()
                .map_err(|e| AppError::email(format!("Invalid to address: {}", e)))?)
            .subject(notification.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(notification.text.clone()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(notification.html.clone())),
            )
            .map_err(|e| AppError::email(format!("Failed to build email: {}", e)))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailService {
    async fn send(&self, notification: &Notification) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::warn!(to = %notification.to, subject = %notification.subject, "email service is disabled, skipping send");
            return Ok(());
        }

        let message = self.build_message(notification)?;
        let creds = Credentials::new(self.config.smtp_username.clone(), self.config.smtp_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| AppError::email(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(creds)
            .port(self.config.smtp_port)
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| AppError::email(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %notification.to, "email sent");
        Ok(())
    }
}

/// Invitation sent to someone who received a golden ticket.
pub fn golden_ticket_invitation(to: &str, app_url: &str) -> Notification {
    Notification {
        to: to.to_string(),
        subject: "You've been invited to Mailroom".to_string(),
        text: golden_ticket_text(app_url),
        html: golden_ticket_html(app_url),
    }
}

fn golden_ticket_text(app_url: &str) -> String {
    format!(
        "You've got a golden ticket!\n\n\
        Someone with early access to Mailroom passed their ticket on to you. \
        Your account now has early access.\n\n\
        Sign in here: {app_url}\n\n\
        If you weren't expecting this, you can ignore this email.\n"
    )
}

fn golden_ticket_html(app_url: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>You've been invited to Mailroom</title>
    <style>
        body {{
            margin: 0;
            padding: 0;
            background-color: #FAFBFC;
            color: #141517;
            font-family: Inter, -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            line-height: 1.6;
        }}
        .card {{
            max-width: 560px;
            margin: 40px auto;
            padding: 32px;
            background-color: #FFFFFF;
            border-radius: 12px;
        }}
        .button {{
            display: inline-block;
            padding: 12px 24px;
            background-color: #141517;
            color: #FFFFFF !important;
            border-radius: 8px;
            text-decoration: none;
        }}
    </style>
</head>
<body>
    <div class="card">
        <h1>You've got a golden ticket!</h1>
        <p>Someone with early access to Mailroom passed their ticket on to you. Your account now has early access.</p>
        <p><a class="button" href="{app_url}">Open Mailroom</a></p>
        <p>If you weren't expecting this, you can ignore this email.</p>
    </div>
</body>
</html>
"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> EmailConfig {
        EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: "test".to_string(),
            smtp_password: "test".to_string(),
            from_address: "noreply@mailroom.test".to_string(),
            from_name: "Mailroom".to_string(),
            app_url: "https://mailroom.test".to_string(),
            enabled,
        }
    }

    #[test]
    fn invitation_links_to_app() {
        let notification = golden_ticket_invitation("friend@example.com", "https://mailroom.test");
        assert_eq!(notification.to, "friend@example.com");
        assert!(notification.text.contains("https://mailroom.test"));
        assert!(notification.html.contains("href=\"https://mailroom.test\""));
        assert!(notification.html.contains("golden ticket"));
    }

    #[test]
    fn builds_multipart_message() {
        let service = EmailService::new(config(true));
        let notification = golden_ticket_invitation("friend@example.com", "https://mailroom.test");
        assert!(service.build_message(&notification).is_ok());
    }

    #[test]
    fn invalid_recipient_is_an_email_error() {
        let service = EmailService::new(config(true));
        let notification = golden_ticket_invitation("not an address", "https://mailroom.test");
        assert!(matches!(service.build_message(&notification), Err(AppError::Email { .. })));
    }

    #[tokio::test]
    async fn disabled_service_skips_sending() {
        let service = EmailService::new(config(false));
        let notification = golden_ticket_invitation("friend@example.com", "https://mailroom.test");
        assert!(service.send(&notification).await.is_ok());
    }
}
