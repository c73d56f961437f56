//! Transport configuration for the chat client.

use std::collections::HashMap;
use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "DELTASTREAM_API_URL";

/// Environment variable holding the session cookie (`name=value`).
pub const SESSION_COOKIE_ENV: &str = "DELTASTREAM_SESSION";

/// A secret string type for sensitive data like session cookies.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// HTTP transport options.
///
/// # Example
/// ```rust
/// use deltastream::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("https://chat.example.com")
///     .with_timeout(Duration::from_secs(120))
///     .with_session_cookie("fastapiusersauth=abc123");
///
/// assert_eq!(options.endpoint("/api/chat"), "https://chat.example.com/api/chat");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the chat backend
    pub base_url: String,

    /// Overall request timeout. `None` means a hung stream blocks until the
    /// caller cancels it.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Session cookie sent with every request, as `name=value`
    pub session_cookie: Option<SecretString>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl TransportOptions {
    /// Create options for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            proxy: None,
            session_cookie: None,
            extra_headers: None,
        }
    }

    /// Read options from the process environment.
    ///
    /// Uses [`BASE_URL_ENV`] and [`SESSION_COOKIE_ENV`]; unset or empty
    /// variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build options from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut options = match non_empty(BASE_URL_ENV) {
            Some(base_url) => Self::new(base_url.trim()),
            None => Self::default(),
        };
        options.session_cookie = non_empty(SESSION_COOKIE_ENV).map(SecretString::from);
        options
    }

    /// Full URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the session cookie.
    pub fn with_session_cookie(mut self, cookie: impl Into<SecretString>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}
