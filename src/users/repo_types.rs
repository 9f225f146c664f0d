use sqlx::FromRow;

use crate::store::Audit;

/// User row in the database. `password_hash` never leaves the process;
/// external representations go through
/// [`PublicUser`](crate::users::dto::PublicUser).
#[derive(Debug, Clone, FromRow)]
pub struct User {
    #[sqlx(flatten)]
    pub audit: Audit,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}
