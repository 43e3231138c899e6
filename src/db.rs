use crate::config::DatabaseConfig;
use rocket::fairing::AdHoc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Builds the pool without connecting; connections open on first use.
fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .connect_lazy(&db_config.url)
}

pub fn stage_db(db_config: DatabaseConfig) -> AdHoc {
    AdHoc::try_on_ignite("Postgres (sqlx)", |rocket| async move {
        let pool = match init_pool(&db_config) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "invalid database configuration");
                return Err(rocket);
            }
        };

        if db_config.run_migrations {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                tracing::error!(error = %e, "failed to run database migrations");
                return Err(rocket);
            }
            tracing::info!("database migrations applied");
        }

        tracing::info!("database pool initialized");
        Ok(rocket.manage(pool))
    })
}
