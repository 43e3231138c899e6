use sqlx::PgPool;

/// Store access backed by the shared Postgres pool. Each repository trait in
/// this module is implemented for it.
#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

impl PostgresRepository {
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
