//! Client IP extraction for per-IP rate limiting.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap, request::Parts},
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Anything carrying request headers and extensions.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP.
///
/// With `trust_forwarded_for`, the left-most `X-Forwarded-For` entry is used
/// and a missing header is an error (no fallback to the socket address, which
/// would be the proxy). Otherwise the `ConnectInfo` peer address is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded_for: bool,
) -> Result<String, &'static str> {
    if trust_forwarded_for {
        let value = source
            .headers()
            .get(FORWARDED_FOR)
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        let first = value.split(',').next().map(str::trim).unwrap_or_default();
        if first.is_empty() {
            return Err("IP header is empty");
        }
        return Ok(first.to_string());
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}
