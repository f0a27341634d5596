//! Utility functions for the carnet-login module.

use std::collections::BTreeMap;
use std::path::Path;

use url::Url;

use crate::error::Result;

/// Mask a token for safe display in logs.
pub fn mask_secret(secret: &str) -> String {
    if secret.len() <= 13 {
        return "***".to_string();
    }
    let prefix = &secret[..8];
    let suffix = &secret[secret.len() - 5..];
    format!("{prefix}***{suffix}")
}

/// Set restrictive file permissions (0600 on Unix).
pub fn set_file_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Collect query and fragment parameters of a URL; fragment values win.
pub fn url_params(url: &Url) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    params
}

/// Resolve a form action against the page it came from, keeping scheme and host.
pub fn resolve_action(page: &Url, action: &str) -> Result<Url> {
    Ok(page.join(action)?)
}
