//! Server-side sessions
//!
//! The session owns the authenticated user and the pending authorization.
//! Handlers load a [`Session`] from a [`SessionStore`], mutate it, and save it
//! back; logout destroys the store entry.

use crate::strategy::PendingAuthorization;
use crate::types::SessionUser;
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use moka::future::Cache;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Data kept server-side for one browser session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub pending: Option<PendingAuthorization>,
}

/// Storage backend for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    async fn save(&self, id: &str, data: SessionData) -> Result<()>;

    /// Remove the session; completes once the entry is gone
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// In-process session store, entries expire after `ttl` without access
pub struct MemorySessionStore {
    cache: Cache<String, Arc<SessionData>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_idle(ttl).build(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        Ok(self.cache.get(id).await.map(|data| (*data).clone()))
    }

    async fn save(&self, id: &str, data: SessionData) -> Result<()> {
        self.cache.insert(id.to_string(), Arc::new(data)).await;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.cache.invalidate(id).await;
        Ok(())
    }
}

/// Generate a random session id
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Session bound to the current request
pub struct Session {
    id: String,
    data: SessionData,
    loaded: SessionData,
    store: Arc<dyn SessionStore>,
    destroyed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Session {
    /// Load the session named by the cookie
    ///
    /// Unknown or missing ids start an empty session under a fresh id.
    pub async fn load(store: Arc<dyn SessionStore>, id: Option<&str>) -> Result<Self> {
        let data = match id {
            Some(id) => store.load(id).await?,
            None => None,
        };
        match (id, data) {
            (Some(id), Some(data)) => Ok(Self {
                id: id.to_string(),
                loaded: data.clone(),
                data,
                store,
                destroyed: false,
            }),
            _ => Ok(Self::fresh(store)),
        }
    }

    /// Empty session under a new id
    pub fn fresh(store: Arc<dyn SessionStore>) -> Self {
        Self {
            id: generate_session_id(),
            data: SessionData::default(),
            loaded: SessionData::default(),
            store,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.user.is_some()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.data.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut SessionUser> {
        self.data.user.as_mut()
    }

    pub fn set_user(&mut self, user: SessionUser) {
        self.data.user = Some(user);
    }

    pub fn set_pending(&mut self, pending: PendingAuthorization) {
        self.data.pending = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingAuthorization> {
        self.data.pending.take()
    }

    /// Forget the authenticated user, keeping the session itself
    pub fn logout(&mut self) {
        self.data.user = None;
    }

    /// Remove the session from the store
    /// Move the data to a new id and drop the old store entry
    ///
    /// The next [`Session::save`] writes the data under the new id.
    pub async fn regenerate(&mut self) -> Result<()> {
        self.store.destroy(&self.id).await?;
        self.id = generate_session_id();
        self.loaded = SessionData::default();
        Ok(())
    }

    pub async fn destroy(&mut self) -> Result<()> {
        self.store.destroy(&self.id).await?;
        self.data = SessionData::default();
        self.loaded = SessionData::default();
        self.destroyed = true;
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// True when the data differs from what was loaded
    pub fn is_modified(&self) -> bool {
        self.data != self.loaded
    }

    /// Persist the session if it changed, returns whether it was written
    pub async fn save(&mut self) -> Result<bool> {
        if self.destroyed || !self.is_modified() {
            return Ok(false);
        }
        self.store.save(&self.id, self.data.clone()).await?;
        self.loaded = self.data.clone();
        Ok(true)
    }
}
