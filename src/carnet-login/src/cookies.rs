//! Cookie jar shared with the HTTP client and persisted between runs.
//!
//! Cookies are keyed by domain and name. Path and secure attributes are
//! ignored since the identity provider only relies on host-scoped session
//! cookies. A cookie the server expires is removed from the jar.

use std::collections::BTreeMap;
use std::sync::Mutex;

use reqwest::Url;
use reqwest::header::HeaderValue;

/// A single persisted cookie.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
}

/// Serializable snapshot of the jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CookieBlob {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
}

impl CookieBlob {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

type DomainCookies = BTreeMap<String, BTreeMap<String, String>>;

/// Thread-safe cookie jar usable as a `reqwest` cookie provider.
#[derive(Debug, Default)]
pub struct SessionCookies {
    inner: Mutex<DomainCookies>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `Set-Cookie` header received from `url`.
    pub fn store(&self, set_cookie: &str, url: &Url) {
        let Some(cookie) = SetCookie::parse(set_cookie) else {
            tracing::debug!(url = %url, "Ignoring malformed Set-Cookie header");
            return;
        };
        let Some(domain) = cookie.domain.or_else(|| url.host_str().map(str::to_string)) else {
            return;
        };
        let mut jar = self.lock();
        if cookie.expired {
            tracing::debug!(name = %cookie.name, %domain, "Removing expired cookie");
            if let Some(cookies) = jar.get_mut(&domain) {
                cookies.remove(&cookie.name);
                if cookies.is_empty() {
                    jar.remove(&domain);
                }
            }
            return;
        }
        jar.entry(domain).or_default().insert(cookie.name, cookie.value);
    }

    /// `Cookie` header value for a request to `url`.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let jar = self.lock();
        let pairs: Vec<String> = jar
            .iter()
            .filter(|(domain, _)| domain_matches(host, domain))
            .flat_map(|(_, cookies)| cookies.iter().map(|(n, v)| format!("{n}={v}")))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Snapshot for persistence.
    pub fn snapshot(&self) -> CookieBlob {
        let jar = self.lock();
        let cookies = jar
            .iter()
            .flat_map(|(domain, cookies)| {
                cookies.iter().map(move |(name, value)| StoredCookie {
                    domain: domain.clone(),
                    name: name.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        CookieBlob { cookies }
    }

    /// Merge a persisted snapshot into the jar.
    pub fn restore(&self, blob: CookieBlob) {
        let mut jar = self.lock();
        for cookie in blob.cookies {
            jar.entry(cookie.domain)
                .or_default()
                .insert(cookie.name, cookie.value);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DomainCookies> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl reqwest::cookie::CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                self.store(raw, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}

/// The parts of a `Set-Cookie` header the jar keeps.
#[derive(Debug, PartialEq, Eq)]
struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    /// Empty value, `Max-Age<=0` or an `Expires` date in the past.
    expired: bool,
}

impl SetCookie {
    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim();

        let mut domain = None;
        let mut expired = value.is_empty();
        for attr in parts {
            let Some((key, val)) = attr.split_once('=') else {
                continue;
            };
            let (key, val) = (key.trim(), val.trim());
            if key.eq_ignore_ascii_case("domain") {
                domain = Some(val.trim_start_matches('.').to_ascii_lowercase()).filter(|d| !d.is_empty());
            } else if key.eq_ignore_ascii_case("max-age") {
                expired |= val.parse::<i64>().is_ok_and(|age| age <= 0);
            } else if key.eq_ignore_ascii_case("expires") {
                expired |= chrono::DateTime::parse_from_rfc2822(val)
                    .is_ok_and(|at| at.timestamp() <= chrono::Utc::now().timestamp());
            }
        }

        Some(Self {
            name: name.to_string(),
            value: value.to_string(),
            domain,
            expired,
        })
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host.eq_ignore_ascii_case(domain)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
}
