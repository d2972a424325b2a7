use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    management::cache::{CacheError, CacheStore, TOKEN_TTL, keys},
    spotify::SpotifyConnector,
    types::Token,
};

/// Seconds before expiry at which a token is refreshed.
pub const REFRESH_MARGIN_SECS: u64 = 240;

/// Loads, refreshes and persists the session token.
///
/// The token lives under `spotify_token` in the service cache. When that
/// cache discards writes, the token is kept in a process-local store
/// instead so a login still holds for the life of the process.
#[derive(Clone)]
pub struct TokenManager {
    store: CacheStore,
}

impl TokenManager {
    pub fn new(cache: CacheStore) -> Self {
        let store = if cache.retains_values() {
            cache
        } else {
            debug!("cache discards writes, keeping the session token in memory");
            CacheStore::memory()
        };
        TokenManager { store }
    }

    pub async fn load(&self, cancel: &CancellationToken) -> Result<Option<Token>, CacheError> {
        self.store.get(keys::TOKEN, cancel).await
    }

    pub async fn persist(&self, token: &Token, cancel: &CancellationToken) -> Result<(), CacheError> {
        self.store.set(keys::TOKEN, token, TOKEN_TTL, cancel).await
    }

    pub async fn clear(&self, cancel: &CancellationToken) -> Result<(), CacheError> {
        self.store.delete(keys::TOKEN, cancel).await
    }

    /// Returns a token usable for at least [`REFRESH_MARGIN_SECS`].
    ///
    /// An expiring token is refreshed through `connector` and written back.
    /// `None` means there is no session, or the refresh was rejected.
    pub async fn get_valid_token(
        &self,
        connector: &dyn SpotifyConnector,
        cancel: &CancellationToken,
    ) -> Option<Token> {
        let token = match self.load(cancel).await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read session token");
                return None;
            }
        };

        if !is_expiring(&token, Utc::now().timestamp() as u64) {
            return Some(token);
        }

        debug!("session token is expiring, refreshing");
        match connector.refresh_token(&token).await {
            Ok(fresh) => {
                if let Err(e) = self.persist(&fresh, cancel).await {
                    warn!(error = %e, "failed to persist refreshed token");
                }
                info!("session token refreshed");
                Some(fresh)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                None
            }
        }
    }
}

fn is_expiring(token: &Token, now: u64) -> bool {
    now + REFRESH_MARGIN_SECS >= token.expires_at()
}
