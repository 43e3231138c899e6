use crate::auth::Session;
use crate::database::early_access::EarlyAccessRepository;
use crate::error::app_error::AppError;
use crate::models::early_access::{EarlyAccessStatusResponse, EmailRequest, TicketOutcome, TicketRejection, normalize_email};
use crate::service::email::{Notifier, golden_ticket_invitation};
use tracing::{error, info, warn};
use validator::Validate;

pub struct EarlyAccessService<'a> {
    repository: &'a dyn EarlyAccessRepository,
    notifier: &'a dyn Notifier,
    app_url: &'a str,
}

impl<'a> EarlyAccessService<'a> {
    pub fn new(repository: &'a dyn EarlyAccessRepository, notifier: &'a dyn Notifier, app_url: &'a str) -> Self {
        Self {
            repository,
            notifier,
            app_url,
        }
    }

    /// Passes the caller's one golden ticket to `request.email`.
    ///
    /// The ticket is claimed with a conditional update before the invitee is
    /// registered, so concurrent claims by the same referrer admit one winner.
    pub async fn handle_golden_ticket(&self, session: &Session, request: &EmailRequest) -> Result<TicketOutcome, AppError> {
        let request = request.normalized();
        request.validate()?;
        let invitee = request.email;

        let Some(referrer) = self.repository.get_referrer(&session.user_id).await? else {
            return Ok(TicketOutcome::Rejected(TicketRejection::UserNotFound));
        };
        if referrer.has_used_ticket() {
            return Ok(TicketOutcome::Rejected(TicketRejection::AlreadyClaimed));
        }
        if !referrer.is_early_access() {
            return Ok(TicketOutcome::Rejected(TicketRejection::NotEligible));
        }

        let referrer_email = normalize_email(&referrer.email);
        if !self.repository.claim_ticket(&referrer_email, &invitee).await? {
            warn!(user_id = %session.user_id, "golden ticket claimed concurrently");
            return Ok(TicketOutcome::Rejected(TicketRejection::AlreadyClaimed));
        }

        if let Err(err) = self.register(&invitee).await {
            if let Err(release_err) = self.repository.release_ticket(&referrer_email, &invitee).await {
                error!(error = %release_err, user_id = %session.user_id, "failed to release golden ticket");
            }
            return Err(err);
        }

        let notification = golden_ticket_invitation(&invitee, self.app_url);
        if let Err(err) = self.notifier.send(&notification).await {
            error!(error = %err, invitee = %invitee, "failed to send golden ticket invitation");
        }

        info!(user_id = %session.user_id, invitee = %invitee, "golden ticket claimed");
        Ok(TicketOutcome::Claimed)
    }

    async fn register(&self, invitee: &str) -> Result<(), AppError> {
        match self.repository.register_invitee(invitee).await {
            Ok(_) => Ok(()),
            Err(AppError::Conflict(constraint)) => {
                warn!(constraint = %constraint, invitee = %invitee, "invitee already registered, granting early access");
                self.repository.grant_early_access(invitee).await
            }
            Err(err) => Err(err),
        }
    }

    /// Adds `request.email` to the waitlist. Returns false if it was already known.
    pub async fn join_waitlist(&self, request: &EmailRequest) -> Result<bool, AppError> {
        let request = request.normalized();
        request.validate()?;
        let email = request.email;
        let joined = self.repository.join_waitlist(&email).await?;
        if joined {
            info!(email = %email, "joined waitlist");
        }
        Ok(joined)
    }

    pub async fn status(&self, session: &Session) -> Result<EarlyAccessStatusResponse, AppError> {
        let email = normalize_email(&session.email);
        let record = self.repository.get_early_access(&email).await?;
        Ok(EarlyAccessStatusResponse::new(&email, record.as_ref()))
    }
}
