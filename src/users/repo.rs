use serde_json::Value;
use sqlx::{query_builder::Separated, Sqlite};

use crate::config::SecurityConfig;
use crate::error::StoreError;
use crate::store::{Audit, Record, Store};
use crate::users::password;
use crate::users::repo_types::{NewUser, User};

impl Record for User {
    const TABLE: &'static str = "users";
    const FIELDS: &'static [&'static str] = &["username", "email", "password_hash"];

    type Draft = NewUser;

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn bind_draft(draft: &NewUser, values: &mut Separated<'_, '_, Sqlite, &'static str>) {
        values.push_bind(draft.username.clone());
        values.push_bind(draft.email.clone());
        values.push_bind(draft.password_hash.clone());
    }
}

impl Store<User> {
    /// Find a user by username, soft-deleted ones included.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    /// Find a user by email, soft-deleted ones included.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE email = ?1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }
}

impl User {
    /// Hash `plain` with the configured work factor and persist the new hash.
    pub async fn set_password(
        &self,
        store: &Store<User>,
        security: &SecurityConfig,
        plain: &str,
    ) -> anyhow::Result<User> {
        let hash = password::hash_password(security, plain)?;
        let mut changes = serde_json::Map::new();
        changes.insert("password_hash".to_string(), Value::String(hash));
        Ok(store.update(self, &changes).await?)
    }

    /// Check `plain` against the stored hash. A mismatch is `Ok(false)`.
    pub fn check_password(&self, plain: &str) -> anyhow::Result<bool> {
        password::verify_password(plain, &self.password_hash)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::state::MIGRATOR;

    async fn store() -> Store<User> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        MIGRATOR.run(&pool).await.expect("run migrations");
        Store::new(pool)
    }

    async fn ada(store: &Store<User>, security: &SecurityConfig) -> User {
        let hash = password::hash_password(security, "p@ss").unwrap();
        store
            .save(NewUser {
                username: "ada".to_string(),
                email: "ada@x.io".to_string(),
                password_hash: hash,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn finders_match_exact_values() {
        let s = store().await;
        let security = SecurityConfig::default();
        let user = ada(&s, &security).await;

        let by_name = s.find_by_username("ada").await.unwrap().unwrap();
        assert_eq!(by_name.audit.id, user.audit.id);

        let by_email = s.find_by_email("ada@x.io").await.unwrap().unwrap();
        assert_eq!(by_email.audit.id, user.audit.id);

        assert!(s.find_by_username("grace").await.unwrap().is_none());
        assert!(s.find_by_email("grace@x.io").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finders_see_soft_deleted_users() {
        let s = store().await;
        let security = SecurityConfig::default();
        let user = ada(&s, &security).await;
        s.soft_delete(&user).await.unwrap();

        assert!(s.find_by_username("ada").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn set_password_replaces_hash_and_verifies() {
        let s = store().await;
        let security = SecurityConfig::default();
        let user = ada(&s, &security).await;
        assert!(user.check_password("p@ss").unwrap());

        let updated = user.set_password(&s, &security, "n3w-p@ss").await.unwrap();
        assert_ne!(updated.password_hash, user.password_hash);
        assert!(updated.check_password("n3w-p@ss").unwrap());
        assert!(!updated.check_password("p@ss").unwrap());
    }
}
