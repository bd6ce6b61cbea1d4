//! Authenticated remote store handle for one job.
//!
//! The session owns the job's identity pool. Rotating fetches a credential
//! for the next identity and rebuilds the store handle, so callers always
//! go through [`DriveSession::store`] instead of keeping an old handle.

use crate::pool::ServiceAccountPool;
use crate::{Result, TransferError};
use bridge_traits::{RemoteStore, RemoteStoreFactory};
use core_auth::{CredentialProvider, Identity};
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct DriveSession {
    credentials: Arc<dyn CredentialProvider>,
    factory: Arc<dyn RemoteStoreFactory>,
    scopes: Vec<String>,
    pool: Option<ServiceAccountPool>,
    has_user_token: bool,
    store: Arc<dyn RemoteStore>,
    identity: String,
    reauthenticated: bool,
    event_bus: Option<EventBus>,
    job_id: String,
}

impl DriveSession {
    /// Authenticate as the pool's current identity, or as the user token
    /// when there is no pool.
    ///
    /// `has_user_token` allows one fallback from the pool to the user token
    /// (see [`reauthenticate_once`](Self::reauthenticate_once)).
    pub async fn open(
        credentials: Arc<dyn CredentialProvider>,
        factory: Arc<dyn RemoteStoreFactory>,
        scopes: Vec<String>,
        pool: Option<ServiceAccountPool>,
        has_user_token: bool,
    ) -> Result<Self> {
        let identity = pool.as_ref().map(|p| p.current().clone());
        let (store, identity) =
            Self::connect(&credentials, &factory, &scopes, identity.as_ref()).await?;

        Ok(Self {
            credentials,
            factory,
            scopes,
            pool,
            has_user_token,
            store,
            identity,
            reauthenticated: false,
            event_bus: None,
            job_id: String::new(),
        })
    }

    /// Emit `IdentityRotated` events for `job_id` on this bus.
    pub fn with_events(mut self, event_bus: EventBus, job_id: impl Into<String>) -> Self {
        self.event_bus = Some(event_bus);
        self.job_id = job_id.into();
        self
    }

    async fn connect(
        credentials: &Arc<dyn CredentialProvider>,
        factory: &Arc<dyn RemoteStoreFactory>,
        scopes: &[String],
        identity: Option<&Identity>,
    ) -> Result<(Arc<dyn RemoteStore>, String)> {
        let credential = credentials.get_credentials(scopes, identity).await?;
        let store = factory.connect(&credential.access_token).await?;
        Ok((store, credential.identity_name().to_string()))
    }

    /// Current store handle.
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    pub fn identity_name(&self) -> &str {
        &self.identity
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    /// Switch to the next identity after the store throttled `reason`.
    ///
    /// Without a pool throttling is fatal.
    #[instrument(skip(self), fields(from = %self.identity))]
    pub async fn rotate(&mut self, reason: &str) -> Result<()> {
        let Some(pool) = self.pool.as_mut() else {
            warn!(reason, "Throttled without an identity pool");
            return Err(TransferError::Throttled {
                reason: reason.to_string(),
            });
        };

        let identity = pool.rotate()?.clone();
        let (store, name) =
            Self::connect(&self.credentials, &self.factory, &self.scopes, Some(&identity)).await?;
        self.store = store;
        self.identity = name;

        info!(to = %self.identity, reason, "Switched identity");
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Transfer(TransferEvent::IdentityRotated {
                job_id: self.job_id.clone(),
                identity: self.identity.clone(),
                reason: reason.to_string(),
            }))
            .ok();
        }
        Ok(())
    }

    /// Fall back from the pool to the user token, at most once per job.
    ///
    /// Returns `false` when no fallback is possible, i.e. the session has
    /// no pool, no user token, or already fell back.
    pub async fn reauthenticate_once(&mut self) -> Result<bool> {
        if self.pool.is_none() || !self.has_user_token || self.reauthenticated {
            return Ok(false);
        }
        self.reauthenticated = true;

        let (store, name) =
            Self::connect(&self.credentials, &self.factory, &self.scopes, None).await?;
        self.store = store;
        self.identity = name;
        self.pool = None;

        info!("Re-authenticated with the user token");
        Ok(true)
    }
}

impl std::fmt::Debug for DriveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveSession")
            .field("identity", &self.identity)
            .field("pool_size", &self.pool.as_ref().map(ServiceAccountPool::len))
            .field("reauthenticated", &self.reauthenticated)
            .finish()
    }
}
