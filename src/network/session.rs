//! Session Management
//!
//! Maps connected players to their live fishing session. At most one session
//! per player: joining again replaces the previous one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::game::catalog::{Catalog, LocationId};
use crate::game::services::{PlayerId, PlayerServices};
use crate::game::session::{FishingSession, SessionError};
use crate::network::scheduler::{Outbound, SessionHandle};

/// Manages all active sessions.
pub struct SessionManager {
    catalog: Arc<dyn Catalog>,
    services: Arc<dyn PlayerServices>,
    config: EngineConfig,
    /// Active sessions by player.
    sessions: RwLock<BTreeMap<PlayerId, Arc<SessionHandle>>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new(catalog: Arc<dyn Catalog>, services: Arc<dyn PlayerServices>, config: EngineConfig) -> Self {
        Self {
            catalog,
            services,
            config,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open a session for a player, replacing any session they already had.
    ///
    /// The previous session is gone even when the new one cannot be opened.
    pub async fn join(
        &self,
        player: PlayerId,
        location_id: LocationId,
        outbound: Outbound,
    ) -> Result<Arc<SessionHandle>, SessionError> {
        let (previous, result) = {
            let mut sessions = self.sessions.write().await;
            let previous = sessions.remove(&player);

            let result = FishingSession::join(
                player,
                location_id,
                self.catalog.clone(),
                self.services.clone(),
                self.config.session_timings(),
                entropy(),
            )
            .map(|session| Arc::new(SessionHandle::new(session, outbound, self.config.clone())));

            if let Ok(handle) = &result {
                sessions.insert(player, handle.clone());
            }
            (previous, result)
        };

        if let Some(previous) = previous {
            previous.shutdown().await;
            debug!(player = %player, session = %previous.id(), "Replaced previous session");
        }
        result
    }

    /// Get the session for a player.
    pub async fn get(&self, player: &PlayerId) -> Option<Arc<SessionHandle>> {
        let sessions = self.sessions.read().await;
        sessions.get(player).cloned()
    }

    /// Close a player's session and stop its timers.
    pub async fn leave(&self, player: &PlayerId) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(player)
        };

        match removed {
            Some(handle) => {
                handle.shutdown().await;
                info!(player = %player, session = %handle.id(), "Session closed");
                true
            }
            None => false,
        }
    }

    /// Close a specific session. A newer session for the same player is left alone.
    pub async fn close(&self, player: &PlayerId, session_id: Uuid) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(player) {
                Some(handle) if handle.id() == session_id => sessions.remove(player),
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                handle.shutdown().await;
                info!(player = %player, session = %session_id, "Session closed");
                true
            }
            None => false,
        }
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Stop every session.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            std::mem::take(&mut *sessions).into_values().collect()
        };

        for handle in drained {
            handle.shutdown().await;
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

/// Per-session seed entropy from the wall clock.
fn entropy() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default() as u64
}

// =============================================================================
// TESTS
// =============================================================================
