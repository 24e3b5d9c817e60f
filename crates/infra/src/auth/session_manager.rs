//! Session lifecycle: cache, refresh, and login fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use voltbridge_core::ports::{AccessTokenProvider, AuthError, SessionManager, SessionStore};
use voltbridge_domain::{AuthConfig, Session};

use super::sso::{SsoClient, TokenResponse};

/// Session manager backed by the SSO client and a durable store.
///
/// Keeps one cached session. A plain call prefers the refresh exchange over
/// credential login; a rejected refresh token invalidates the stored session
/// before the login fallback runs. A forced call skips refresh entirely and
/// goes straight to credential login.
pub struct SsoSessionManager {
    sso: SsoClient,
    store: Arc<dyn SessionStore>,
    auth: AuthConfig,
    cached: RwLock<Option<Session>>,
}

impl SsoSessionManager {
    #[must_use]
    pub fn new(sso: SsoClient, store: Arc<dyn SessionStore>, auth: AuthConfig) -> Self {
        Self { sso, store, auth, cached: RwLock::new(None) }
    }

    /// Warm the cache from durable storage. Call once at startup; an
    /// expired stored session is still kept for its refresh token.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), AuthError> {
        match self.store.load().await {
            Ok(Some(session)) => {
                debug!(
                    expires_in = ?session.seconds_until_expiry(),
                    "restored persisted session"
                );
                *self.cached.write().await = Some(session);
                Ok(())
            }
            Ok(None) => {
                debug!("no persisted session");
                Ok(())
            }
            Err(e) => Err(AuthError::Storage(e.to_string())),
        }
    }

    /// Build, cache, and persist a session from a token response.
    async fn install(&self, tokens: TokenResponse, prior_refresh: Option<String>) -> Session {
        let session = Session::new(
            tokens.access_token,
            tokens.refresh_token.or(prior_refresh),
            tokens.token_type,
            tokens.expires_in,
            voltbridge_domain::constants::SSO_CLIENT_ID.to_string(),
        );

        *self.cached.write().await = Some(session.clone());
        if let Err(e) = self.store.save(&session).await {
            // Not fatal: the session works for this process lifetime.
            warn!(error = %e, "failed to persist session");
        }
        session
    }

    /// Best usable refresh token: cached session first, then configuration.
    async fn refresh_token(&self) -> Option<String> {
        if let Some(session) = self.cached.read().await.as_ref() {
            if let Some(token) = &session.refresh_token {
                return Some(token.clone());
            }
        }
        self.auth.refresh_token.clone()
    }

    async fn login_with_credentials(&self) -> Result<Session, AuthError> {
        let (Some(email), Some(password)) = (&self.auth.email, &self.auth.password) else {
            return Err(AuthError::MissingCredentials);
        };

        match self.sso.login(email, password).await {
            Ok(tokens) => Ok(self.install(tokens, None).await),
            Err(e) => {
                // Drop any half-valid cached state so the next attempt
                // starts clean.
                *self.cached.write().await = None;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SessionManager for SsoSessionManager {
    async fn ensure_valid_session(&self, force: bool) -> Result<Session, AuthError> {
        if force {
            // The forced path exists for server-reported auth failures, where
            // the tokens themselves are suspect. Discard the cache and log in
            // from scratch; the stored session is left alone so its refresh
            // token survives a failed login attempt.
            info!("forced re-authentication, skipping refresh");
            *self.cached.write().await = None;
            return self.login_with_credentials().await;
        }

        if let Some(session) = self.cached.read().await.clone() {
            if !session.is_expired(0) {
                return Ok(session);
            }
            debug!("cached session expired");
        } else {
            // Cold start: the store may hold a usable session.
            self.initialize().await?;
            if let Some(session) = self.cached.read().await.clone() {
                if !session.is_expired(0) {
                    return Ok(session);
                }
            }
        }

        if let Some(refresh_token) = self.refresh_token().await {
            match self.sso.refresh(&refresh_token).await {
                Ok(tokens) => {
                    return Ok(self.install(tokens, Some(refresh_token)).await);
                }
                Err(AuthError::RefreshRejected { status, message }) => {
                    warn!(status, message = %message, "refresh token rejected, falling back to login");
                    *self.cached.write().await = None;
                    if let Err(e) = self.store.clear().await {
                        warn!(error = %e, "failed to clear stored session");
                    }
                }
                // Network trouble is not a reason to burn the refresh token.
                Err(e) => return Err(e),
            }
        }

        info!("performing full credential login");
        self.login_with_credentials().await
    }
}

#[async_trait]
impl AccessTokenProvider for SsoSessionManager {
    async fn access_token(&self) -> Option<String> {
        self.cached.read().await.as_ref().map(|s| s.access_token.clone())
    }
}
