//! SSO authentication and session lifecycle.

pub mod pkce;
pub mod session_manager;
pub mod sso;

pub use session_manager::SsoSessionManager;
pub use sso::{SsoClient, SsoConfig, TokenResponse};
