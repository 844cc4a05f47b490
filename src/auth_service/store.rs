use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Registered account. `hashed_password` never leaves the service.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of a [`User`]
#[derive(Debug, Clone, Serialize)]
pub struct UserRead {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
}

impl From<&User> for UserRead {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_verified: user.is_verified,
        }
    }
}

/// In-memory accounts keyed by normalised email. The submitted casing is kept
/// on the account itself.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Insert a new account; `None` if the email is taken
    pub async fn create(&self, email: &str, hashed_password: String) -> Option<User> {
        let key = Self::normalize_email(email);
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return None;
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.trim().to_string(),
            hashed_password,
            is_active: true,
            is_superuser: false,
            is_verified: false,
            created_at: Utc::now(),
        };
        users.insert(key, user.clone());
        Some(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .get(&Self::normalize_email(email))
            .cloned()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.users.read().await.values().find(|u| u.id == id).cloned()
    }

    pub async fn set_active(&self, email: &str, is_active: bool) -> bool {
        match self.users.write().await.get_mut(&Self::normalize_email(email)) {
            Some(user) => {
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}
