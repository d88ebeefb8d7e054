//! Client key extraction
//!
//! A [`KeyExtractor`] maps an inbound request to the opaque string that
//! selects its token bucket. The only requirement is determinism: the same
//! logical client must always produce the same key.

use std::net::SocketAddr;
use std::str::FromStr;

use hyper::header::{HeaderName, InvalidHeaderName};
use hyper::{HeaderMap, Method, Request, Uri};

/// Key used when no client identity can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Peer address of the connection a request arrived on.
///
/// Inserted into request extensions by [`AdmissionServer`](crate::AdmissionServer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Borrowed view of the parts of a request that key extractors may use.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl<'a> RequestHead<'a> {
    /// Builds a head from a request, reading the peer address from its
    /// [`RemoteAddr`] extension if present.
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            uri: req.uri(),
            headers: req.headers(),
            remote_addr: req.extensions().get::<RemoteAddr>().map(|r| r.0),
        }
    }
}

/// Maps a request to its client key.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, head: &RequestHead<'_>) -> String;
}

impl<F> KeyExtractor for F
where
    F: Fn(&RequestHead<'_>) -> String + Send + Sync,
{
    fn extract(&self, head: &RequestHead<'_>) -> String {
        self(head)
    }
}

/// Identifies clients by the IP address of the connection, port excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerIp;

impl KeyExtractor for PeerIp {
    fn extract(&self, head: &RequestHead<'_>) -> String {
        head.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Identifies clients by a request header such as an API key.
///
/// Requests without the header, or with a value that is not valid UTF-8,
/// fall back to [`PeerIp`].
#[derive(Debug, Clone)]
pub struct HeaderKey {
    name: HeaderName,
}

impl HeaderKey {
    pub fn new(name: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            name: HeaderName::from_str(name)?,
        })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.name
    }
}

impl KeyExtractor for HeaderKey {
    fn extract(&self, head: &RequestHead<'_>) -> String {
        match head.headers.get(&self.name).map(|v| v.to_str()) {
            Some(Ok(value)) if !value.is_empty() => value.to_string(),
            _ => PeerIp.extract(head),
        }
    }
}

/// Puts every request in the same bucket.
#[derive(Debug, Clone)]
pub struct StaticKey(pub String);

impl StaticKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl KeyExtractor for StaticKey {
    fn extract(&self, _head: &RequestHead<'_>) -> String {
        self.0.clone()
    }
}
