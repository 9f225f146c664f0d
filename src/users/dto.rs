use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo_types::User;

/// Request body for user creation. Presence and non-emptiness are checked by
/// the handler so failures surface in the service's error envelope.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Public part of a user returned to clients. The password hash and the
/// soft-delete bookkeeping never appear here.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.audit.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.audit.created_at,
            updated_at: user.audit.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::store::Audit;

    #[test]
    fn public_user_excludes_secrets_and_bookkeeping() {
        let user = User {
            audit: Audit {
                id: 7,
                created_at: datetime!(2024-01-01 00:00:00 UTC),
                updated_at: datetime!(2024-01-02 12:30:00 UTC),
                deleted_at: None,
                retain_for: 30,
            },
            username: "ada".to_string(),
            email: "ada@x.io".to_string(),
            password_hash: "$argon2id$secret".to_string(),
        };

        let value = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["username"], "ada");
        assert_eq!(value["email"], "ada@x.io");
        assert_eq!(value["created_at"], "2024-01-01T00:00:00Z");
        assert_eq!(value["updated_at"], "2024-01-02T12:30:00Z");

        let object = value.as_object().unwrap();
        assert!(!object.contains_key("password_hash"));
        assert!(!object.contains_key("deleted_at"));
        assert!(!object.contains_key("retain_for"));
    }

    #[test]
    fn create_request_tolerates_missing_fields() {
        let req: CreateUserRequest = serde_json::from_str(r#"{"username": "ada"}"#).unwrap();
        assert_eq!(req.username.as_deref(), Some("ada"));
        assert!(req.email.is_none());
        assert!(req.password.is_none());
    }
}
