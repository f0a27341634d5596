//! Blocking request/response executor.
//!
//! Redirects are followed here rather than by `reqwest` so the chain can be
//! recorded and a redirect into the [`CUSTOM_SCHEME`] can be captured instead of
//! dispatched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::constants::{CUSTOM_SCHEME, USER_AGENT};
use crate::cookies::{CookieBlob, SessionCookies};
use crate::error::{Error, Result};

/// Default timeout for every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Raw { content_type: String, payload: String },
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append query parameters to the URL.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        self.url
            .query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
        self
    }

    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body = Body::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn raw(mut self, content_type: impl Into<String>, payload: impl Into<String>) -> Self {
        self.body = Body::Raw {
            content_type: content_type.into(),
            payload: payload.into(),
        };
        self
    }

    /// Value of a form field, if the body is a form.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            Body::Form(pairs) => pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Value of a header, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Final response of a (possibly redirected) request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower case.
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// URL of the last hop; a custom-scheme URL when the chain was captured.
    pub final_url: Url,
    /// Every URL that answered with a redirect, in order.
    pub history: Vec<Url>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn is_json(&self) -> bool {
        self.content_type().contains("json")
    }

    /// Whether the redirect chain ended in the custom scheme.
    pub fn reached_custom_scheme(&self) -> bool {
        self.final_url.scheme() == CUSTOM_SCHEME
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn a status >= 400 into [`Error::Transport`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status < 400 {
            return Ok(self);
        }
        let message = match serde_json::from_str::<ErrorBody>(&self.body) {
            Ok(parsed) => {
                debug!("Response error in JSON format");
                parsed.message(self.status)
            }
            Err(_) => {
                debug!("Response error is not JSON format");
                format!("Error: status code {}", self.status)
            }
        };
        Err(Error::Transport {
            status: self.status,
            message,
        })
    }
}

/// `{"error": {"errorCode": ..., "description": ...}}`
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    error_code: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

impl ErrorBody {
    fn message(&self, status: u16) -> String {
        let mut msg = format!("Error {status}");
        if let Some(detail) = &self.error {
            msg.push(':');
            match &detail.error_code {
                Some(serde_json::Value::String(code)) => msg.push_str(&format!(" [{code}]")),
                Some(code) => msg.push_str(&format!(" [{code}]")),
                None => {}
            }
            if let Some(description) = &detail.description {
                msg.push(' ');
                msg.push_str(description);
            }
        }
        msg
    }
}

/// Generic executor used by the session, login flow and gateway.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Snapshot of the cookies accumulated so far.
    fn cookies(&self) -> CookieBlob;

    /// Seed the jar with cookies from a previous run.
    fn restore_cookies(&self, blob: CookieBlob);
}

/// `reqwest` backed transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    cookies: Arc<SessionCookies>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let cookies = Arc::new(SessionCookies::new());
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(Arc::clone(&cookies))
            .build()?;
        Ok(Self { client, cookies })
    }

    fn dispatch(
        &self,
        method: Method,
        url: &Url,
        headers: &[(String, String)],
        body: &Body,
    ) -> Result<reqwest::blocking::Response> {
        let mut builder = match method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        };
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            Body::Empty => builder,
            Body::Form(pairs) => builder.form(pairs),
            Body::Json(value) => builder.json(value),
            Body::Raw {
                content_type,
                payload,
            } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(payload.clone()),
        };
        Ok(builder.send()?)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            mut method,
            mut url,
            headers,
            mut body,
        } = request;
        let mut history = Vec::new();

        loop {
            if url.scheme() == CUSTOM_SCHEME {
                debug!(url = %url, "Captured redirect into custom scheme");
                return Ok(HttpResponse {
                    status: 200,
                    headers: BTreeMap::new(),
                    body: String::new(),
                    final_url: url,
                    history,
                });
            }

            info!(method = %method, url = %url, "Sending request");
            let response = self.dispatch(method, &url, &headers, &body)?;
            let status = response.status();
            info!(status = status.as_u16(), "Response received");

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if let (true, Some(location)) = (status.is_redirection(), location) {
                if history.len() >= MAX_REDIRECTS {
                    return Err(Error::Unexpected(format!(
                        "more than {MAX_REDIRECTS} redirects starting at {}",
                        history.first().unwrap_or(&url)
                    )));
                }
                let next = url.join(&location)?;
                debug!(from = %url, to = %next, "Following redirect");
                let downgrade = status == StatusCode::SEE_OTHER
                    || (method == Method::Post
                        && (status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND));
                if downgrade {
                    method = Method::Get;
                    body = Body::Empty;
                }
                history.push(std::mem::replace(&mut url, next));
                continue;
            }

            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.text()?;
            debug!(history = history.len(), "Request complete");

            return Ok(HttpResponse {
                status: status.as_u16(),
                headers,
                body,
                final_url: url,
                history,
            });
        }
    }

    fn cookies(&self) -> CookieBlob {
        self.cookies.snapshot()
    }

    fn restore_cookies(&self, blob: CookieBlob) {
        self.cookies.restore(blob);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    type Seen = Arc<Mutex<Vec<String>>>;

    /// Serve raw HTTP responses from a local socket, one connection per request.
    /// Each request is recorded as `METHOD target` plus its `cookie` header.
    fn serve(reply: fn(&str, &str) -> String) -> (Url, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let seen: Seen = Arc::default();
        let log = Arc::clone(&seen);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut cookie = String::new();
                let mut length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        match name.to_ascii_lowercase().as_str() {
                            "cookie" => cookie = value.trim().to_string(),
                            "content-length" => length = value.trim().parse().unwrap(),
                            _ => {}
                        }
                    }
                }
                let mut body = vec![0; length];
                reader.read_exact(&mut body).unwrap();

                let mut words = request_line.split_whitespace();
                let method = words.next().unwrap_or_default().to_string();
                let target = words.next().unwrap_or_default().to_string();
                let entry = if cookie.is_empty() {
                    format!("{method} {target}")
                } else {
                    format!("{method} {target} [{cookie}]")
                };
                log.lock().unwrap().push(entry);

                let response = reply(&method, &target);
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (base, seen)
    }

    fn redirect(status: &str, location: &str, extra: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nLocation: {location}\r\n{extra}Content-Length: 0\r\nConnection: close\r\n\r\n"
        )
    }

    fn page(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn response(status: u16, content_type: &str, body: &str) -> HttpResponse {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        HttpResponse {
            status,
            headers,
            body: body.to_string(),
            final_url: Url::parse("https://msg.volkswagen.de/fs-car/x").unwrap(),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_error_for_status_json_body() {
        let resp = response(
            403,
            "application/json",
            r#"{"error":{"errorCode":"gw.error.authorization","description":"Forbidden"}}"#,
        );
        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.to_string(),
            "Error 403: [gw.error.authorization] Forbidden"
        );
    }

    #[test]
    fn test_error_for_status_non_json_body() {
        let resp = response(502, "text/html", "<html>Bad gateway</html>");
        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.to_string(), "Error: status code 502");
    }

    #[test]
    fn test_error_for_status_passes_success() {
        let resp = response(202, "application/json", "{}");
        assert!(resp.error_for_status().is_ok());
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::get(Url::parse("https://identity.vwgroup.io/oidc/v1/authorize").unwrap())
            .query(&[("prompt", "login"), ("scope", "openid profile")])
            .header("Accept", "text/html");
        assert_eq!(
            req.url.as_str(),
            "https://identity.vwgroup.io/oidc/v1/authorize?prompt=login&scope=openid+profile"
        );
        assert_eq!(req.header_value("accept"), Some("text/html"));

        let post = HttpRequest::post(req.url.clone()).form([("email", "a@b.c")]);
        assert_eq!(post.form_value("email"), Some("a@b.c"));
    }

    #[test]
    fn test_custom_scheme_is_captured_without_network() {
        let transport = HttpTransport::new().unwrap();
        let url = Url::parse("carnet://identity-kit/login#code=abc").unwrap();
        let resp = transport.send(HttpRequest::get(url.clone())).unwrap();
        assert!(resp.reached_custom_scheme());
        assert_eq!(resp.final_url, url);
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_redirect_chain_into_custom_scheme() {
        let (base, seen) = serve(|_, target| match target {
            "/auth" => redirect("302 Found", "/cb?user_id=u1", "Set-Cookie: S=1; Path=/; HttpOnly\r\n"),
            "/cb?user_id=u1" => redirect(
                "302 Found",
                "carnet://identity-kit/login#code=c&id_token=t",
                "",
            ),
            _ => page("unexpected"),
        });
        let transport = HttpTransport::new().unwrap();

        let request = HttpRequest::post(base.join("auth").unwrap()).form([("password", "hunter2")]);
        let resp = transport.send(request).unwrap();

        assert!(resp.reached_custom_scheme());
        assert_eq!(resp.final_url.as_str(), "carnet://identity-kit/login#code=c&id_token=t");
        assert_eq!(
            resp.history,
            vec![base.join("auth").unwrap(), base.join("cb?user_id=u1").unwrap()]
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["POST /auth".to_string(), "GET /cb?user_id=u1 [S=1]".to_string()]
        );
        let cookies = transport.cookies().cookies;
        assert_eq!(cookies.len(), 1);
        assert_eq!((cookies[0].name.as_str(), cookies[0].value.as_str()), ("S", "1"));
    }

    #[test]
    fn test_see_other_ends_on_page() {
        let (base, seen) = serve(|_, target| match target {
            "/form" => redirect("303 See Other", "/done", ""),
            _ => page("<html>done</html>"),
        });
        let transport = HttpTransport::new().unwrap();

        let resp = transport
            .send(HttpRequest::post(base.join("form").unwrap()).form([("a", "1")]))
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "<html>done</html>");
        assert_eq!(resp.content_type(), "text/html");
        assert_eq!(resp.final_url, base.join("done").unwrap());
        assert_eq!(resp.history.len(), 1);
        assert!(!resp.reached_custom_scheme());
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["POST /form".to_string(), "GET /done".to_string()]
        );
    }

    #[test]
    fn test_redirect_loop_is_bounded() {
        let (base, seen) = serve(|_, _| redirect("302 Found", "/loop", ""));
        let transport = HttpTransport::new().unwrap();

        let err = transport
            .send(HttpRequest::get(base.join("loop").unwrap()))
            .unwrap_err();

        assert!(err.to_string().contains("more than 20 redirects"));
        assert_eq!(seen.lock().unwrap().len(), MAX_REDIRECTS + 1);
    }
}
