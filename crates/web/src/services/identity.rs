//! Identity provider client (OIDC authorization-code flow).
//!
//! # Flow
//!
//! 1. Build the authorization URL with `authorization_url()` and redirect
//! 2. The provider redirects back to `/auth/callback` with a code
//! 3. Exchange the code for tokens with `exchange_code()`
//! 4. Read the subject and profile with `userinfo()`
//!
//! The application keeps its own session cookie afterwards; provider tokens are
//! not stored.

use std::sync::Arc;

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::config::IdentityConfig;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Transport failure.
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the code or our client credentials.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The userinfo response was unusable.
    #[error("invalid userinfo response: {0}")]
    UserInfo(String),
}

/// Tokens returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Standard OIDC userinfo claims.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Client for the identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    issuer_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl IdentityClient {
    /// Create a new identity provider client.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            inner: Arc::new(IdentityClientInner {
                client: reqwest::Client::new(),
                issuer_url: config.issuer_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            }),
        }
    }

    /// Authorization URL to send the browser to.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - Callback URL registered with the provider
    /// * `state` - Random value stored in the session to prevent CSRF
    /// * `nonce` - Random value for replay protection
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str, nonce: &str) -> String {
        format!(
            "{}/oauth/authorize?\
            client_id={}&\
            response_type=code&\
            redirect_uri={}&\
            scope=openid%20email%20profile&\
            state={}&\
            nonce={}",
            self.inner.issuer_url,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(nonce)
        )
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects the code.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, IdentityError> {
        let url = format!("{}/oauth/token", self.inner.issuer_url);
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.inner.client.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::TokenExchange(text));
        }

        Ok(response.json().await?)
    }

    /// Fetch the signed-in user's claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no subject.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, IdentityError> {
        let url = format!("{}/oauth/userinfo", self.inner.issuer_url);
        let response = self
            .inner
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::UserInfo(format!(
                "status {}",
                response.status()
            )));
        }

        let info: UserInfo = response.json().await?;
        if info.sub.trim().is_empty() {
            return Err(IdentityError::UserInfo("empty subject".to_string()));
        }
        Ok(info)
    }
}

/// Generate a random alphanumeric string for OAuth state and nonce values.
#[must_use]
pub fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|&b| char::from(b))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> IdentityClient {
        IdentityClient::new(&IdentityConfig {
            issuer_url: "https://auth.kado.test".to_string(),
            client_id: "kado web".to_string(),
            client_secret: SecretString::from("unused"),
        })
    }

    #[test]
    fn test_authorization_url_encodes_parameters() {
        let url = client().authorization_url("https://kado.test/auth/callback", "st", "nn");
        assert!(url.starts_with("https://auth.kado.test/oauth/authorize?"));
        assert!(url.contains("client_id=kado%20web"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fkado.test%2Fauth%2Fcallback"));
        assert!(url.contains("state=st"));
        assert!(url.contains("nonce=nn"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn test_generate_random_string() {
        let value = generate_random_string(32);
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(value, generate_random_string(32));
    }

    #[test]
    fn test_userinfo_claims_deserialize() {
        let info: UserInfo =
            serde_json::from_str(r#"{"sub":"user_2abc","email":"ash@kado.test"}"#).unwrap();
        assert_eq!(info.sub, "user_2abc");
        assert_eq!(info.name, None);
    }
}
