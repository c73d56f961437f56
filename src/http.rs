//! HTTP client construction and request decoration.

use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use tracing::warn;

use crate::options::{SecretString, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// The client keeps a cookie store so session cookies set by the backend are
/// sent back on later requests.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().cookie_store(true);

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => warn!(proxy = %proxy_url, error = %err, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Attach the configured session cookie to a request.
pub fn add_session_cookie(
    request: RequestBuilder,
    session_cookie: &Option<SecretString>,
) -> RequestBuilder {
    match session_cookie {
        Some(cookie) => request.header(COOKIE, cookie.expose_secret()),
        None => request,
    }
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}
