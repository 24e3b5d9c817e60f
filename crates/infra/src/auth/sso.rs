//! SSO client: token refresh and the interactive credential login flow.
//!
//! The vendor's SSO uses an OAuth authorization-code flow with PKCE but no
//! browser: the login form is fetched, its hidden fields are replayed with
//! the credentials, and the authorization code arrives in a redirect we
//! intercept by disabling redirect following.

use std::time::Duration;

use regex::Regex;
use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use voltbridge_core::ports::AuthError;
use voltbridge_domain::constants::{SSO_CLIENT_ID, SSO_REDIRECT_URI, SSO_SCOPES};

use super::pkce::PkceChallenge;

/// SSO endpoint configuration.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Base URL of the SSO service
    pub base_url: String,
    /// OAuth client id
    pub client_id: String,
    /// Registered redirect URI
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: String,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://auth.tesla.com".to_string(),
            client_id: SSO_CLIENT_ID.to_string(),
            redirect_uri: SSO_REDIRECT_URI.to_string(),
            scopes: SSO_SCOPES.to_string(),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// HTTP client for the SSO service.
///
/// Keeps a cookie store: the login form sets session cookies the credential
/// POST must carry. Redirects are never followed so the authorization code
/// can be read off the 302.
pub struct SsoClient {
    http: reqwest::Client,
    config: SsoConfig,
}

impl SsoClient {
    /// Create an SSO client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SsoConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Network(format!("failed to build SSO client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Exchange a refresh token for fresh tokens.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        debug!("refreshing access token");

        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.config.client_id),
                ("refresh_token", refresh_token),
                ("scope", &self.config.scopes),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AuthError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(status, "token refresh rejected");
            return Err(AuthError::RefreshRejected { status, message: snippet(&body) });
        }

        let tokens: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::RefreshRejected { status, message: format!("unparseable token response: {e}") }
        })?;
        info!("access token refreshed");
        Ok(tokens)
    }

    /// Full credential login: form fetch, credential submit, code exchange.
    ///
    /// Accounts with multi-factor authentication enabled cannot log in this
    /// way; seed a refresh token instead.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        info!("starting credential login");
        let pkce = PkceChallenge::generate();
        let authorize_url = self.authorize_url(&pkce);

        let form_fields = self.fetch_login_form(&authorize_url).await?;
        let code = self.submit_credentials(&authorize_url, form_fields, email, password).await?;
        self.exchange_code(&code, &pkce.code_verifier).await
    }

    /// Step 1: fetch the login form, capturing cookies and hidden fields.
    async fn fetch_login_form(
        &self,
        authorize_url: &str,
    ) -> Result<Vec<(String, String)>, AuthError> {
        let response = self
            .http
            .get(authorize_url)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AuthError::Network(e.to_string()))?;

        if status != 200 {
            return Err(AuthError::LoginStep {
                step: "authorize form".to_string(),
                status,
                message: snippet(&body),
            });
        }

        let fields = extract_hidden_fields(&body);
        if fields.is_empty() {
            return Err(AuthError::LoginStep {
                step: "authorize form".to_string(),
                status,
                message: "login form contained no hidden fields".to_string(),
            });
        }
        debug!(fields = fields.len(), "login form fetched");
        Ok(fields)
    }

    /// Step 2: replay the hidden fields with the credentials; the
    /// authorization code comes back in a 302 Location.
    async fn submit_credentials(
        &self,
        authorize_url: &str,
        mut form: Vec<(String, String)>,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        form.push(("identity".to_string(), email.to_string()));
        form.push(("credential".to_string(), password.to_string()));

        let response = self
            .http
            .post(authorize_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 302 {
            // A re-rendered form means bad credentials or an MFA prompt.
            return Err(AuthError::LoginStep {
                step: "credentials".to_string(),
                status,
                message: "credentials rejected or additional verification required".to_string(),
            });
        }

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        extract_query_param(location, "code").ok_or_else(|| AuthError::LoginStep {
            step: "credentials".to_string(),
            status,
            message: "redirect carried no authorization code".to_string(),
        })
    }

    /// Step 3: exchange the authorization code for tokens.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", &self.config.client_id),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", &self.config.redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AuthError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(AuthError::LoginStep {
                step: "token exchange".to_string(),
                status,
                message: snippet(&body),
            });
        }

        let tokens: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::LoginStep {
                step: "token exchange".to_string(),
                status,
                message: format!("unparseable token response: {e}"),
            }
        })?;
        info!("credential login succeeded");
        Ok(tokens)
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v3/token", self.config.base_url)
    }

    fn authorize_url(&self, pkce: &PkceChallenge) -> String {
        format!(
            "{}/oauth2/v3/authorize?client_id={}&code_challenge={}&code_challenge_method={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.base_url,
            urlencoding::encode(&self.config.client_id),
            pkce.code_challenge,
            pkce.challenge_method(),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scopes),
            pkce.state,
        )
    }
}

/// Hidden input fields of the login form, in document order.
fn extract_hidden_fields(html: &str) -> Vec<(String, String)> {
    let Ok(re) =
        Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
    else {
        return Vec::new();
    };
    re.captures_iter(html).map(|c| (c[1].to_string(), c[2].to_string())).collect()
}

fn extract_query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

fn snippet(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.len() <= MAX_LEN {
        return body.to_string();
    }
    body.chars().take(MAX_LEN).collect()
}
