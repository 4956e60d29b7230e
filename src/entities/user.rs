use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::entity::Entity;
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

/// Local copy of the signed-in account. The id is the auth provider's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            created_at: Some(Utc::now()),
        }
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";
    const ENTITY_TYPE: &'static str = "user";
    const REMOTE_TABLE: &'static str = "profiles";
    // the row id is the user id
    const REMOTE_OWNED: bool = false;

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("email").required().email())
        .field(FieldSchema::string("displayName").max_length(80))
        .field(FieldSchema::string("createdAt").date_time())
}

pub struct UserRepository {
    inner: Repository<User>,
}

impl UserRepository {
    pub fn new(inner: Repository<User>) -> Self {
        Self { inner }
    }

    /// Case-insensitive email lookup.
    pub async fn by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .inner
            .find(|u| u.email.to_lowercase() == email)
            .await?
            .into_iter()
            .next())
    }
}

impl Deref for UserRepository {
    type Target = Repository<User>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_repository;
    use crate::entity::new_id;

    #[tokio::test]
    async fn test_by_email() {
        let users = UserRepository::new(test_repository());
        let sam = users
            .create(User::new(new_id(), "Sam@Example.com"))
            .await
            .unwrap();

        assert_eq!(users.by_email("sam@example.com ").await.unwrap(), Some(sam));
        assert!(users.by_email("other@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let users = UserRepository::new(test_repository());
        let err = users
            .create(User::new(new_id(), "not-an-email"))
            .await
            .unwrap_err();
        assert!(err.validation_errors().unwrap().has_path("email"));
    }
}
