//! User storage
//!
//! [`UserStore`] is the persistence seam of users-core. The bundled
//! [`InMemoryUserStore`] keeps accounts in process memory with secondary
//! indexes on username and current access token.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{Error, Result, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Usernames are unique.
    async fn create_user(&self, user: User) -> Result<User>;

    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Find the user currently holding `access_token`.
    async fn get_user_by_access_token(&self, access_token: &str) -> Result<Option<User>>;

    /// Replace a stored user, keeping the indexes in step.
    async fn update_user(&self, user: User) -> Result<User>;

    async fn delete_user(&self, id: &str) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<User>>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    by_username: HashMap<String, String>,
    by_access_token: HashMap<String, String>,
}

impl Tables {
    fn unindex(&mut self, user: &User) {
        self.by_username.remove(&user.username);
        if let Some(token) = &user.access_token {
            self.by_access_token.remove(token);
        }
    }

    fn index(&mut self, user: &User) {
        self.by_username.insert(user.username.clone(), user.id.clone());
        if let Some(token) = &user.access_token {
            self.by_access_token.insert(token.clone(), user.id.clone());
        }
    }
}

/// Process-local [`UserStore`]; clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write();
        if tables.by_username.contains_key(&user.username) {
            return Err(Error::UserAlreadyExists(user.username));
        }
        if tables.users.contains_key(&user.id) {
            return Err(Error::Internal(format!("Duplicate user id {}", user.id)));
        }
        tables.index(&user);
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .by_username
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn get_user_by_access_token(&self, access_token: &str) -> Result<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .by_access_token
            .get(access_token)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_user(&self, mut user: User) -> Result<User> {
        let mut tables = self.tables.write();
        let Some(previous) = tables.users.get(&user.id).cloned() else {
            return Err(Error::UserNotFound(user.id));
        };
        if previous.username != user.username && tables.by_username.contains_key(&user.username) {
            return Err(Error::UserAlreadyExists(user.username));
        }

        user.updated_at = Utc::now();
        tables.unindex(&previous);
        tables.index(&user);
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let Some(user) = tables.users.remove(id) else {
            return Err(Error::UserNotFound(id.to_string()));
        };
        tables.unindex(&user);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}
