use std::sync::Arc;

use anyhow::Context;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqlitePool, SqlitePoolOptions},
};

use crate::config::{AppConfig, DbConfig, Environment, SecurityConfig};
use crate::store::Store;
use crate::users::repo_types::User;

/// Schema migrations, embedded at compile time. Applied at startup and by
/// test pools.
pub static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub users: Store<User>,
}

impl AppState {
    /// Connect to the configured database and wire up the stores.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let url = config.effective_database_url()?;
        let db = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .context("connect to database")?;
        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>) -> Self {
        let users = Store::new(db.clone());
        Self { db, config, users }
    }

    /// State over a fresh in-memory database with the schema applied. For
    /// tests.
    pub async fn memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        MIGRATOR.run(&db).await?;

        let config = Arc::new(AppConfig {
            app_name: "userhub-test".into(),
            environment: Environment::Development,
            host: "127.0.0.1".into(),
            port: 0,
            database_url: Some("sqlite::memory:".into()),
            db: DbConfig::default(),
            security: SecurityConfig::default(),
        });
        Ok(Self::from_parts(db, config))
    }
}
