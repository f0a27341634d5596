//! Persisted credential store: the cookie jar and the access record.
//!
//! Both files live in the state directory. A missing file means "no prior
//! session"; an unreadable one is logged and treated the same way so that the
//! next login overwrites it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::constants::{ACCESS_FILE, SESSION_FILE};
use crate::cookies::CookieBlob;
use crate::error::Result;
use crate::ledger::{TokenEntry, TokenLedger};
use crate::types::IdentityContext;
use crate::utils::set_file_permissions;

/// Everything besides cookies that survives between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccessRecord {
    #[serde(default)]
    pub identity: IdentityContext,
    /// Primary token pair.
    #[serde(default)]
    pub tokens: Option<TokenEntry>,
    /// Client registration id for the OAuth endpoint.
    #[serde(default, rename = "x-client-id")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub oauth: BTreeMap<String, TokenEntry>,
}

impl AccessRecord {
    pub fn new(identity: IdentityContext, ledger: &TokenLedger, client_id: Option<String>) -> Self {
        Self {
            identity,
            tokens: ledger.primary().cloned(),
            client_id,
            oauth: ledger.oauth_entries(),
        }
    }

    pub fn ledger(&self) -> TokenLedger {
        TokenLedger::from_parts(self.tokens.clone(), self.oauth.clone())
    }
}

/// File-backed store rooted at the state directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn access_path(&self) -> PathBuf {
        self.dir.join(ACCESS_FILE)
    }

    pub fn load_cookies(&self) -> Option<CookieBlob> {
        load_json(&self.session_path(), "Session file")
    }

    pub fn save_cookies(&self, cookies: &CookieBlob) -> Result<()> {
        write_json(&self.session_path(), cookies)?;
        tracing::debug!(count = cookies.cookies.len(), "Saved session cookies");
        Ok(())
    }

    pub fn load_access(&self) -> Option<AccessRecord> {
        load_json(&self.access_path(), "Access file")
    }

    pub fn save_access(&self, record: &AccessRecord) -> Result<()> {
        write_json(&self.access_path(), record)?;
        tracing::info!("Saved access to file");
        Ok(())
    }
}

fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "{what} not found");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "{what} unreadable, ignoring");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "{what} corrupt, ignoring");
            None
        }
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    set_file_permissions(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::StoredCookie;
    use crate::ledger::TokenScope;

    #[test]
    fn test_missing_files_are_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        assert!(store.load_cookies().is_none());
        assert!(store.load_access().is_none());
    }

    #[test]
    fn test_corrupt_access_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        std::fs::write(store.access_path(), "{ not json").unwrap();
        assert!(store.load_access().is_none());
    }

    #[test]
    fn test_access_record_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested"));

        let mut oauth = BTreeMap::new();
        oauth.insert(
            "sc2:fal".to_string(),
            TokenEntry {
                access_token: "fal".to_string(),
                refresh_token: Some("fal-refresh".to_string()),
                id_token: None,
                expires_in: 3600,
                issued_at: 1_700_000_000,
                scope: TokenScope::Vehicle,
            },
        );
        let record = AccessRecord {
            identity: IdentityContext {
                user_id: Some("user-1".to_string()),
                profile_url: Some("https://profile/user-1".to_string()),
                business_id: None,
            },
            tokens: None,
            client_id: Some("client-xyz".to_string()),
            oauth,
        };

        store.save_access(&record).unwrap();
        assert_eq!(store.load_access(), Some(record));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.access_path()).unwrap()).unwrap();
        assert_eq!(raw["x-client-id"], "client-xyz");
        assert_eq!(raw["oauth"]["sc2:fal"]["access_token"], "fal");
    }

    #[test]
    fn test_cookie_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let blob = CookieBlob {
            cookies: vec![StoredCookie {
                domain: "identity.vwgroup.io".to_string(),
                name: "SESSION".to_string(),
                value: "abc".to_string(),
            }],
        };
        store.save_cookies(&blob).unwrap();
        assert_eq!(store.load_cookies(), Some(blob));
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save_cookies(&CookieBlob::default()).unwrap();
        let mode = std::fs::metadata(store.session_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
