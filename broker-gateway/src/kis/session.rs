//! OAuth access-token cache shared by every KIS call.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use trading::GatewayError;

/// A token is renewed this long before it actually expires.
pub const EXPIRY_MARGIN_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    access_token: String,
    #[serde(rename = "token_exp")]
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Usable at `now`, margin included.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && now < self.expires_at - Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }
}

/// Holds the current token behind a mutex. Concurrent callers that find the
/// token stale wait on the lock while one of them refreshes it.
#[derive(Debug, Default)]
pub struct TokenSession {
    cached: Mutex<Option<AccessToken>>,
    file: Option<PathBuf>,
}

impl TokenSession {
    /// # Arguments
    ///
    /// * `file` - Optional JSON file the token is persisted to, so restarts
    ///   within the token lifetime do not request a new one.
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            cached: Mutex::new(None),
            file,
        }
    }

    /// Returns a fresh bearer token, calling `refresh` only when neither the
    /// memory copy nor the file copy is usable.
    pub fn bearer<F>(&self, now: DateTime<Utc>, refresh: F) -> Result<String, GatewayError>
    where
        F: FnOnce() -> Result<AccessToken, GatewayError>,
    {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| GatewayError::BrokerUnavailable("token session poisoned".into()))?;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            debug!("Token valid until {}", token.expires_at);
            return Ok(token.access_token.clone());
        }

        if cached.is_none() {
            if let Some(token) = self.file.as_deref().and_then(load_token) {
                if token.is_fresh(now) {
                    info!("Loaded token from file (expires {})", token.expires_at);
                    let value = token.access_token.clone();
                    *cached = Some(token);
                    return Ok(value);
                }
            }
        }

        info!("Token expired or not set, requesting a new one");
        let token = refresh()?;
        if let Some(path) = &self.file {
            if let Err(e) = save_token(path, &token) {
                warn!("Failed to save token to {}: {}", path.display(), e);
            }
        }
        info!("Token refreshed, expires {}", token.expires_at);
        let value = token.access_token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drops the cached token so the next call refreshes it.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }
}

fn load_token(path: &Path) -> Option<AccessToken> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Ignoring unreadable token file {}: {}", path.display(), e);
            None
        }
    }
}

fn save_token(path: &Path, token: &AccessToken) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(token)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn token(value: &str, expires_in_minutes: i64, now: DateTime<Utc>) -> AccessToken {
        AccessToken::new(value, now + Duration::minutes(expires_in_minutes))
    }

    #[test]
    fn refreshes_once_then_reuses() {
        let now = Utc::now();
        let session = TokenSession::new(None);
        let calls = Cell::new(0);
        let refresh = || {
            calls.set(calls.get() + 1);
            Ok(token("abc", 60, now))
        };
        assert_eq!(session.bearer(now, refresh).unwrap(), "abc");
        assert_eq!(session.bearer(now, refresh).unwrap(), "abc");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn token_inside_margin_is_renewed() {
        let now = Utc::now();
        let session = TokenSession::new(None);
        session.bearer(now, || Ok(token("old", 9, now))).unwrap();
        let value = session.bearer(now, || Ok(token("new", 600, now))).unwrap();
        assert_eq!(value, "new");
    }

    #[test]
    fn file_copy_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens/kis_token.json");
        let now = Utc::now();

        TokenSession::new(Some(path.clone()))
            .bearer(now, || Ok(token("persisted", 120, now)))
            .unwrap();

        let restarted = TokenSession::new(Some(path));
        let value = restarted
            .bearer(now, || -> Result<AccessToken, GatewayError> {
                panic!("should reuse the file token")
            })
            .unwrap();
        assert_eq!(value, "persisted");
    }

    #[test]
    fn refresh_failure_propagates() {
        let session = TokenSession::new(None);
        let err = session
            .bearer(Utc::now(), || {
                Err(GatewayError::BrokerUnavailable("auth failed with status 403".into()))
            })
            .unwrap_err();
        assert!(matches!(err, GatewayError::BrokerUnavailable(_)));
    }
}
