//! Signed direct-upload parameters for the image CDN.
//!
//! The browser uploads straight to the CDN; we only sign the parameters. Avatar
//! signatures are throttled per user with a process-local cache, so the limit is
//! per instance and resets on restart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};

use kado_core::UserId;

use crate::config::MediaConfig;

/// Avatar signatures allowed per user within [`AVATAR_WINDOW`].
pub const AVATAR_LIMIT: u32 = 5;

/// Throttle window for avatar signatures.
pub const AVATAR_WINDOW: Duration = Duration::from_secs(600);

/// What an upload is for; decides the folder and preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Avatar,
    ListingPhoto,
}

impl UploadKind {
    fn folder(self, user: &UserId) -> String {
        match self {
            Self::Avatar => format!("avatars/{user}"),
            Self::ListingPhoto => format!("listings/{user}"),
        }
    }
}

/// Parameters the browser sends to the CDN along with the file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub signature: String,
    pub timestamp: i64,
    pub api_key: String,
    pub cloud_name: String,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_preset: Option<String>,
}

/// The per-user avatar throttle is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many avatar uploads, try again later")]
pub struct Throttled;

/// Signs upload parameters and checks delivered asset URLs.
#[derive(Clone)]
pub struct MediaSigner {
    inner: Arc<MediaSignerInner>,
}

struct MediaSignerInner {
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
    avatar_preset: Option<String>,
    listing_preset: Option<String>,
    /// user id -> (window start, signatures issued in window)
    avatar_throttle: Cache<UserId, (Instant, u32)>,
}

impl MediaSigner {
    #[must_use]
    pub fn new(config: &MediaConfig) -> Self {
        let avatar_throttle = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(AVATAR_WINDOW)
            .build();

        Self {
            inner: Arc::new(MediaSignerInner {
                cloud_name: config.cloud_name.clone(),
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
                avatar_preset: config.avatar_preset.clone(),
                listing_preset: config.listing_preset.clone(),
                avatar_throttle,
            }),
        }
    }

    /// Issue signed upload parameters for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Throttled`] when an avatar signature would exceed the per-user limit.
    pub async fn sign_upload(
        &self,
        user: &UserId,
        kind: UploadKind,
    ) -> Result<SignedUpload, Throttled> {
        if kind == UploadKind::Avatar {
            self.consume_avatar_slot(user).await?;
        }

        let folder = kind.folder(user);
        let upload_preset = match kind {
            UploadKind::Avatar => self.inner.avatar_preset.clone(),
            UploadKind::ListingPhoto => self.inner.listing_preset.clone(),
        };
        let timestamp = chrono::Utc::now().timestamp();

        let mut params = BTreeMap::new();
        params.insert("folder", folder.clone());
        params.insert("timestamp", timestamp.to_string());
        if let Some(ref preset) = upload_preset {
            params.insert("upload_preset", preset.clone());
        }

        Ok(SignedUpload {
            signature: sign_params(&params, self.inner.api_secret.expose_secret()),
            timestamp,
            api_key: self.inner.api_key.clone(),
            cloud_name: self.inner.cloud_name.clone(),
            folder,
            upload_preset,
        })
    }

    async fn consume_avatar_slot(&self, user: &UserId) -> Result<(), Throttled> {
        let now = Instant::now();
        let (window_start, used) = match self.inner.avatar_throttle.get(user).await {
            Some((start, used)) if now.duration_since(start) < AVATAR_WINDOW => (start, used),
            _ => (now, 0),
        };

        if used >= AVATAR_LIMIT {
            tracing::info!(user_id = %user, "Avatar upload signature throttled");
            return Err(Throttled);
        }

        self.inner
            .avatar_throttle
            .insert(user.clone(), (window_start, used + 1))
            .await;
        Ok(())
    }

    /// Whether `url` points at this account's assets on the CDN.
    #[must_use]
    pub fn is_hosted_asset(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        parsed.scheme() == "https"
            && parsed.host_str() == Some(MediaConfig::delivery_host())
            && parsed
                .path_segments()
                .and_then(|mut segments| segments.next())
                .is_some_and(|first| first == self.inner.cloud_name)
    }
}

/// Hex SHA-256 of `k1=v1&k2=v2...` (keys sorted) followed by the API secret.
#[must_use]
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn signer() -> MediaSigner {
        MediaSigner::new(&MediaConfig {
            cloud_name: "kado".to_string(),
            api_key: "1234".to_string(),
            api_secret: SecretString::from("abcd"),
            avatar_preset: Some("avatars".to_string()),
            listing_preset: None,
        })
    }

    #[test]
    fn test_sign_params_sorts_keys() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("folder", "avatars/u1".to_string());

        let mut hasher = Sha256::new();
        hasher.update(b"folder=avatars/u1&timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(sign_params(&params, "abcd"), expected);
    }

    #[tokio::test]
    async fn test_avatar_signatures_are_throttled() {
        let signer = signer();
        let user = UserId::new("user_1");
        for _ in 0..AVATAR_LIMIT {
            let upload = signer.sign_upload(&user, UploadKind::Avatar).await.unwrap();
            assert_eq!(upload.folder, "avatars/user_1");
            assert_eq!(upload.upload_preset.as_deref(), Some("avatars"));
        }
        assert_eq!(
            signer.sign_upload(&user, UploadKind::Avatar).await.unwrap_err(),
            Throttled
        );

        // Other users and listing photos are unaffected.
        assert!(signer.sign_upload(&UserId::new("user_2"), UploadKind::Avatar).await.is_ok());
        let photo = signer.sign_upload(&user, UploadKind::ListingPhoto).await.unwrap();
        assert_eq!(photo.folder, "listings/user_1");
    }

    #[test]
    fn test_is_hosted_asset() {
        let signer = signer();
        assert!(signer.is_hosted_asset("https://res.cloudinary.com/kado/image/upload/v1/a.jpg"));
        assert!(!signer.is_hosted_asset("https://res.cloudinary.com/other/image/upload/a.jpg"));
        assert!(!signer.is_hosted_asset("https://evil.example/kado/a.jpg"));
        assert!(!signer.is_hosted_asset("not a url"));
    }
}
