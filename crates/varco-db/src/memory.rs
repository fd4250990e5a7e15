//! In-memory store implementations
//!
//! Test doubles for the storage traits. The user and link stores share
//! one link map so `create_linked` stays visible to link lookups, the
//! same way the PostgreSQL pair shares the `identity_links` table.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use varco_core::{
    IdentityLinkStore, KeyValueStore, LocalUser, NewUser, Result, SessionData, SessionId,
    SessionStore, UserId, UserStore, VarcoError,
};

type LinkMap = Arc<RwLock<HashMap<(String, String), UserId>>>;

/// Construct a user store and a link store sharing the same link map
pub fn memory_stores() -> (Arc<MemoryUserStore>, Arc<MemoryIdentityLinkStore>) {
    let links: LinkMap = Arc::new(RwLock::new(HashMap::new()));
    (
        Arc::new(MemoryUserStore {
            users: RwLock::new(HashMap::new()),
            links: links.clone(),
        }),
        Arc::new(MemoryIdentityLinkStore { links }),
    )
}

pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, LocalUser>>,
    links: LinkMap,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<LocalUser>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<LocalUser>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .any(|u| u.username == username))
    }

    async fn create_linked(
        &self,
        user: &NewUser,
        provider: &str,
        authname: &str,
    ) -> Result<LocalUser> {
        let mut users = self.users.write().await;
        let mut links = self.links.write().await;

        if users.values().any(|u| u.username == user.username) {
            return Err(VarcoError::database(format!(
                "username already taken: {}",
                user.username
            )));
        }

        let now = Utc::now();
        let created = LocalUser {
            id: UserId::new(),
            username: user.username.clone(),
            email: user.email.clone(),
            given_name: user.given_name.clone(),
            family_name: user.family_name.clone(),
            fiscal_code: user.fiscal_code.clone(),
            mobile_phone: user.mobile_phone.clone(),
            roles: user.roles.clone(),
            active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        users.insert(created.id, created.clone());
        links.insert((provider.to_string(), authname.to_string()), created.id);
        Ok(created)
    }

    async fn update(&self, user: &LocalUser) -> Result<LocalUser> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(VarcoError::not_found("user", user.id.to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}

impl MemoryUserStore {
    /// Seed an account directly, bypassing reconciliation
    pub async fn insert(&self, user: LocalUser) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

pub struct MemoryIdentityLinkStore {
    links: LinkMap,
}

#[async_trait]
impl IdentityLinkStore for MemoryIdentityLinkStore {
    async fn find_user(&self, provider: &str, authname: &str) -> Result<Option<UserId>> {
        Ok(self
            .links
            .read()
            .await
            .get(&(provider.to_string(), authname.to_string()))
            .copied())
    }

    async fn link(&self, provider: &str, authname: &str, user_id: UserId) -> Result<()> {
        self.links
            .write()
            .await
            .insert((provider.to_string(), authname.to_string()), user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<()> {
        self.sessions.write().await.insert(*id, data.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
