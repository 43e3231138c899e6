use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::early_access::{EarlyAccess, Referrer};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait EarlyAccessRepository: Send + Sync {
    async fn get_referrer(&self, user_id: &Uuid) -> Result<Option<Referrer>, AppError>;
    async fn get_early_access(&self, email: &str) -> Result<Option<EarlyAccess>, AppError>;
    /// Marks the referrer's ticket as spent on `invitee`. Returns false when it was already spent.
    async fn claim_ticket(&self, referrer_email: &str, invitee: &str) -> Result<bool, AppError>;
    async fn release_ticket(&self, referrer_email: &str, invitee: &str) -> Result<(), AppError>;
    /// Creates the invitee's record with early access granted.
    async fn register_invitee(&self, email: &str) -> Result<EarlyAccess, AppError>;
    async fn grant_early_access(&self, email: &str) -> Result<(), AppError>;
    /// Returns false when the email was already known.
    async fn join_waitlist(&self, email: &str) -> Result<bool, AppError>;
}

#[async_trait::async_trait]
impl EarlyAccessRepository for PostgresRepository {
    async fn get_referrer(&self, user_id: &Uuid) -> Result<Option<Referrer>, AppError> {
        let referrer = sqlx::query_as::<_, Referrer>(
            r#"
            SELECT lower(btrim(u.email)) AS email, ea.is_early_access, ea.has_used_ticket
            FROM users u
            LEFT JOIN early_access ea ON ea.email = lower(btrim(u.email))
            WHERE u.id = $1
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referrer)
    }

    async fn get_early_access(&self, email: &str) -> Result<Option<EarlyAccess>, AppError> {
        let record = sqlx::query_as::<_, EarlyAccess>(
            r#"
            SELECT id, email, is_early_access, has_used_ticket, created_at, updated_at
            FROM early_access
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn claim_ticket(&self, referrer_email: &str, invitee: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE early_access
            SET has_used_ticket = $2, updated_at = now()
            WHERE email = $1
              AND is_early_access
              AND has_used_ticket = ''
            "#,
        )
        .bind(referrer_email)
        .bind(invitee)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_ticket(&self, referrer_email: &str, invitee: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE early_access
            SET has_used_ticket = '', updated_at = now()
            WHERE email = $1 AND has_used_ticket = $2
            "#,
        )
        .bind(referrer_email)
        .bind(invitee)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn register_invitee(&self, email: &str) -> Result<EarlyAccess, AppError> {
        let record = sqlx::query_as::<_, EarlyAccess>(
            r#"
            INSERT INTO early_access (email, is_early_access, has_used_ticket)
            VALUES ($1, true, '')
            ON CONFLICT (email)
            DO UPDATE SET is_early_access = true, updated_at = now()
            RETURNING id, email, is_early_access, has_used_ticket, created_at, updated_at
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn grant_early_access(&self, email: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE early_access SET is_early_access = true, updated_at = now() WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No early access record for {}", email)));
        }

        Ok(())
    }

    async fn join_waitlist(&self, email: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO early_access (email, is_early_access, has_used_ticket)
            VALUES ($1, false, '')
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::postgres_repository::testing;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn concurrent_claims_admit_one_winner() {
        let repo = testing::repository().await;
        let (user_id, email) = testing::insert_user(&repo).await;
        repo.register_invitee(&email).await.unwrap();

        let (a, b) = tokio::join!(repo.claim_ticket(&email, "a@example.com"), repo.claim_ticket(&email, "b@example.com"));
        assert_eq!([a.unwrap(), b.unwrap()].iter().filter(|won| **won).count(), 1);

        let referrer = repo.get_referrer(&user_id).await.unwrap().unwrap();
        assert!(referrer.has_used_ticket());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn referrer_lookup_ignores_user_email_case() {
        let repo = testing::repository().await;
        let email = format!("Mixed-{}@Example.com", Uuid::new_v4().simple());
        let user_id: Uuid = sqlx::query_scalar("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(&email)
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        repo.register_invitee(&email.to_lowercase()).await.unwrap();

        let referrer = repo.get_referrer(&user_id).await.unwrap().unwrap();
        assert_eq!(referrer.email, email.to_lowercase());
        assert!(referrer.is_early_access());
        assert!(repo.claim_ticket(&referrer.email, "friend@example.com").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn waitlist_join_is_idempotent() {
        let repo = testing::repository().await;
        let email = format!("wait-{}@example.com", Uuid::new_v4().simple());

        assert!(repo.join_waitlist(&email).await.unwrap());
        assert!(!repo.join_waitlist(&email).await.unwrap());
        assert!(!repo.get_early_access(&email).await.unwrap().unwrap().is_early_access);
    }
}
