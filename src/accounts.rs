//! Locally registered users for the register and login commands.

use crate::error::{AccountError, StoreError};
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const USERS_KEY: &str = "users";
pub const EMAIL_DOMAIN: &str = "@pfh.de";
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub password: String,
}

pub struct AccountStore<S> {
    store: S,
}

impl<S: KeyValueStore> AccountStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and persist a new account
    pub fn register(&self, email: &str, password: &str) -> Result<UserRecord, AccountError> {
        let email = email.trim().to_lowercase();
        if !email.ends_with(EMAIL_DOMAIN) || email.len() == EMAIL_DOMAIN.len() {
            return Err(AccountError::InvalidEmail(EMAIL_DOMAIN));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::WeakPassword(MIN_PASSWORD_LEN));
        }

        let mut users = self.load()?;
        if users.iter().any(|user| user.email == email) {
            return Err(AccountError::AlreadyRegistered(email));
        }

        let record = UserRecord {
            email,
            password: password.to_string(),
        };
        users.push(record.clone());
        self.save(&users)?;

        info!("Registered {}", record.email);
        Ok(record)
    }

    /// Check credentials against the registered users
    pub fn login(&self, email: &str, password: &str) -> Result<UserRecord, AccountError> {
        let email = email.trim().to_lowercase();
        let users = self.users();
        let user = users
            .into_iter()
            .find(|user| user.email == email)
            .ok_or_else(|| AccountError::UnknownUser(email.clone()))?;

        if user.password != password {
            return Err(AccountError::WrongPassword);
        }
        Ok(user)
    }

    /// Registered users; unreadable storage counts as none
    pub fn users(&self) -> Vec<UserRecord> {
        self.load().unwrap_or_else(|e| {
            error!("Error loading users: {}", e);
            Vec::new()
        })
    }

    fn load(&self) -> Result<Vec<UserRecord>, StoreError> {
        match self.store.get(USERS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, users: &[UserRecord]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(users)?;
        self.store.set(USERS_KEY, &raw)
    }
}
