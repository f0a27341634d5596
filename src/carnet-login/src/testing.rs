//! Scripted in-memory transport for tests.
//!
//! Routes match on method and a URL substring; the longest matching substring
//! wins. Queued responses are handed out in order and the last one repeats.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use url::Url;

use crate::cookies::{CookieBlob, SessionCookies};
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Canned response for one scripted call.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
    history: Vec<Url>,
    final_url: Option<Url>,
    set_cookies: Vec<String>,
}

impl ScriptedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: String::new(),
            history: Vec::new(),
            final_url: None,
            set_cookies: Vec::new(),
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .body(value.to_string())
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Pretend the request was redirected through `history` and ended at `final_url`.
    pub fn redirected(mut self, history: &[&str], final_url: &str) -> Self {
        self.history = history.iter().filter_map(|u| Url::parse(u).ok()).collect();
        self.final_url = Url::parse(final_url).ok();
        self
    }

    pub fn set_cookie(mut self, cookie: &str) -> Self {
        self.set_cookies.push(cookie.to_string());
        self
    }
}

#[derive(Debug)]
struct Route {
    method: Method,
    pattern: String,
    queue: VecDeque<ScriptedResponse>,
}

#[derive(Debug, Default)]
struct Script {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// Transport answering from a script instead of the network.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    cookies: Arc<SessionCookies>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for requests whose URL contains `pattern`.
    pub fn on(&self, method: Method, pattern: &str, response: ScriptedResponse) -> &Self {
        let mut script = self.lock();
        match script
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.queue.push_back(response),
            None => script.routes.push(Route {
                method,
                pattern: pattern.to_string(),
                queue: VecDeque::from([response]),
            }),
        }
        self
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests matching method and URL substring.
    pub fn count(&self, method: Method, pattern: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.url.as_str().contains(pattern))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        let url = request.url.as_str();
        let route = script
            .routes
            .iter_mut()
            .filter(|r| r.method == request.method && url.contains(&r.pattern))
            .max_by_key(|r| r.pattern.len())
            .ok_or_else(|| Error::Transport {
                status: 404,
                message: format!("no scripted response for {} {url}", request.method),
            })?;

        let canned = if route.queue.len() > 1 {
            route.queue.pop_front()
        } else {
            route.queue.front().cloned()
        }
        .ok_or_else(|| Error::Unexpected(format!("empty script for {url}")))?;
        drop(script);

        let final_url = canned.final_url.unwrap_or(request.url);
        for cookie in &canned.set_cookies {
            self.cookies.store(cookie, &final_url);
        }
        Ok(HttpResponse {
            status: canned.status,
            headers: canned.headers,
            body: canned.body,
            final_url,
            history: canned.history,
        })
    }

    fn cookies(&self) -> CookieBlob {
        self.cookies.snapshot()
    }

    fn restore_cookies(&self, blob: CookieBlob) {
        self.cookies.restore(blob);
    }
}

/// Instant the scripted login is considered to happen at.
pub const LOGIN_NOW: i64 = 1_700_000_000;

const EMAIL_PAGE: &str = r#"<html><head><meta name="identitykit" content="loginIdentifier"></head>
<body>
  <form id="emailPasswordForm" method="post" action="/signin-service/v1/client@apps/login/identifier">
    <input type="hidden" name="_csrf" value="csrf-token">
    <input type="hidden" name="relayState" value="relay-1">
    <input type="email" name="email">
  </form>
</body></html>"#;

const PASSWORD_PAGE: &str = r#"<html><body>
  <script>
    window._IDK = {
      templateModel: {hmac: 'f00d', identifierUrl: 'login/identifier', postAction: 'login/authenticate', emailPasswordForm: {email: 'user@example.com'}},
      currentLocale: 'en'
    };
  </script>
</body></html>"#;

/// Redirect chain ending in the custom scheme, as the password stage sees it.
pub fn login_redirect() -> ScriptedResponse {
    ScriptedResponse::new(200)
        .redirected(
            &[
                "https://identity.vwgroup.io/signin-service/v1/client@apps/login/authenticate",
                "https://identity.vwgroup.io/oidc/v1/oauth/client/callback/success?user_id=user-1&client_id=client%40apps&scopes=openid",
            ],
            "carnet://identity-kit/login#state=s&code=c0de&access_token=kit-access&expires_in=3600&token_type=bearer&id_token=kit-id",
        )
        .set_cookie("SESSION=s3ss10n; Path=/; Secure; HttpOnly")
}

fn token(access: &str, refresh: &str, id_token: Option<&str>) -> ScriptedResponse {
    let mut body = serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600,
    });
    if let Some(id_token) = id_token {
        body["id_token"] = serde_json::Value::from(id_token);
    }
    ScriptedResponse::json(200, body)
}

/// Script a complete successful login: both pages, the capture, the code
/// exchange, client registration, both scope tokens and the profile lookup.
pub fn script_login(transport: &ScriptedTransport) {
    transport
        .on(
            Method::Get,
            "identity.vwgroup.io/oidc/v1/authorize",
            ScriptedResponse::html(EMAIL_PAGE).redirected(
                &["https://identity.vwgroup.io/oidc/v1/authorize"],
                "https://identity.vwgroup.io/signin-service/v1/signin/client@apps?relayState=relay-1",
            ),
        )
        .on(
            Method::Post,
            "/login/identifier",
            ScriptedResponse::html(PASSWORD_PAGE),
        )
        .on(Method::Post, "/login/authenticate", login_redirect())
        .on(
            Method::Post,
            "/exchangeAuthCode",
            token("primary-access", "primary-refresh", Some("primary-id")),
        )
        .on(
            Method::Post,
            "/mobile/register/v1",
            ScriptedResponse::json(200, serde_json::json!({"client_id": "client-xyz"})),
        )
        .on(
            Method::Post,
            "/oauth2/v1/token",
            token("fal-access", "fal-refresh", None),
        )
        .on(
            Method::Post,
            "/oauth2/v1/token",
            token("cubic-access", "cubic-refresh", None),
        )
        .on(
            Method::Get,
            "/personalData",
            ScriptedResponse::json(
                200,
                serde_json::json!({"businessIdentifierValue": "biz-1", "firstName": "Test"}),
            ),
        );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_longest_pattern_wins_and_last_repeats() {
        let t = ScriptedTransport::new();
        t.on(Method::Get, "/vehicles", ScriptedResponse::new(200).body("list"));
        t.on(Method::Get, "/vehicles/VIN/status", ScriptedResponse::new(200).body("one"))
            .on(Method::Get, "/vehicles/VIN/status", ScriptedResponse::new(200).body("two"));

        let send = |u| t.send(get(u)).unwrap().body;
        assert_eq!(send("https://h/vehicles"), "list");
        assert_eq!(send("https://h/vehicles/VIN/status"), "one");
        assert_eq!(send("https://h/vehicles/VIN/status"), "two");
        assert_eq!(send("https://h/vehicles/VIN/status"), "two");
        assert_eq!(t.count(Method::Get, "/status"), 3);
    }

    #[test]
    fn test_unscripted_request_fails() {
        let t = ScriptedTransport::new();
        let err = t.send(get("https://h/nothing")).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(t.requests().len(), 1);
    }

    #[test]
    fn test_cookies_and_redirects() {
        let t = ScriptedTransport::new();
        t.on(
            Method::Get,
            "/authorize",
            ScriptedResponse::html("<html></html>")
                .redirected(&["https://idp/authorize"], "https://idp/signin")
                .set_cookie("SESSION=1"),
        );
        let resp = t.send(get("https://idp/authorize")).unwrap();
        assert_eq!(resp.final_url.as_str(), "https://idp/signin");
        assert_eq!(resp.history.len(), 1);
        assert_eq!(t.cookies().cookies.len(), 1);
    }
}
