//! # HTTP REST Surface
//!
//! The server exposes a `/v1` REST API beside the WebSocket: schema
//! fetching, identity management, ad-hoc reducer calls and SQL. The raw
//! HTTP transport is a collaborator — the core's only contract with it is
//! [`HttpTransport`]: `get`/`post` returning status plus body. [`HttpApi`]
//! implements the endpoint surface over any such transport, which is also
//! how the tests drive it with canned responses.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /v1/database/{name}/schema?version=9     schema descriptor (JSON)
//! POST /v1/identity                             mint identity + token
//! GET  /v1/identity/{id}/verify                 2xx iff token valid
//! GET  /v1/identity/public-key
//! GET  /v1/identity/{id}/databases
//! POST /v1/identity/websocket-token
//! POST /v1/database/{name}/call/{reducer}       JSON or BSATN args
//! POST /v1/database/{name}/sql                  SQL body
//! GET  /v1/database/{name}                      info
//! GET  /v1/database/{name}/names
//! GET  /v1/database/{name}/identity
//! GET  /v1/database/{name}/logs?num_lines=N
//! GET  /v1/ping
//! ```
//!
//! Authorization is `Bearer <token>` whenever a token is configured.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::AuthToken;

// =============================================================================
// Transport Contract
// =============================================================================

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Builds a response; convenient for test doubles.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The HTTP collaborator: blocking GET/POST with optional authorization.
pub trait HttpTransport {
    /// Performs a GET. `auth` is the full `Authorization` header value.
    fn get(&self, url: &str, auth: Option<&str>) -> Result<HttpResponse>;

    /// Performs a POST with an optional body.
    fn post(&self, url: &str, body: Option<&[u8]>, auth: Option<&str>) -> Result<HttpResponse>;
}

// =============================================================================
// JSON Response Shapes
// =============================================================================

/// Identity and token minted by `POST /v1/identity`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityCreds {
    /// Hex-rendered identity.
    pub identity: String,
    /// Bearer token for this identity.
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct DatabasesResponse {
    databases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NamesResponse {
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WebSocketTokenResponse {
    token: String,
}

// =============================================================================
// HttpApi
// =============================================================================

/// The `/v1` endpoint surface over any [`HttpTransport`].
#[derive(Debug)]
pub struct HttpApi<T: HttpTransport> {
    base: String,
    token: Option<AuthToken>,
    transport: T,
}

impl<T: HttpTransport> HttpApi<T> {
    /// Creates an API client. `base` is scheme + host, e.g.
    /// `http://127.0.0.1:3000`.
    pub fn new(base: impl Into<String>, transport: T) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: None,
            transport,
        }
    }

    /// Sets the bearer token presented on subsequent requests.
    pub fn set_token(&mut self, token: AuthToken) {
        self.token = Some(token);
    }

    fn auth(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|t| format!("Bearer {}", t.as_str()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Maps a response to its body, translating error statuses.
    fn check(response: HttpResponse) -> Result<Vec<u8>> {
        match response.status {
            200..=299 => Ok(response.body),
            401 | 403 => Err(Error::Unauthorized),
            404 => Err(Error::NotFound),
            500..=599 => Err(Error::ServerError(response.status)),
            other => Err(Error::RequestFailed(format!("status {other}"))),
        }
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.transport.get(&self.url(path), self.auth().as_deref())?;
        Self::check(response)
    }

    fn post(&self, path: &str, body: Option<&[u8]>) -> Result<Vec<u8>> {
        let response = self
            .transport
            .post(&self.url(path), body, self.auth().as_deref())?;
        Self::check(response)
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Fetches and resolves the schema descriptor for a database.
    pub fn schema(&self, database: &str) -> Result<Schema> {
        let body = self.get(&format!("/v1/database/{database}/schema?version=9"))?;
        Schema::from_json(&body)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Mints a fresh identity and token.
    pub fn create_identity(&self) -> Result<IdentityCreds> {
        let body = self.post("/v1/identity", None)?;
        serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Checks whether the configured token is valid for `identity`.
    ///
    /// `Ok(true)` on 2xx, `Ok(false)` on 401/403, error otherwise.
    pub fn verify_identity(&self, identity: &str) -> Result<bool> {
        let response = self
            .transport
            .get(&self.url(&format!("/v1/identity/{identity}/verify")), self.auth().as_deref())?;
        match response.status {
            200..=299 => Ok(true),
            401 | 403 => Ok(false),
            404 => Err(Error::NotFound),
            500..=599 => Err(Error::ServerError(response.status)),
            other => Err(Error::RequestFailed(format!("status {other}"))),
        }
    }

    /// Fetches the server's token-signing public key.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        self.get("/v1/identity/public-key")
    }

    /// Lists the databases owned by an identity.
    pub fn databases_for(&self, identity: &str) -> Result<Vec<String>> {
        let body = self.get(&format!("/v1/identity/{identity}/databases"))?;
        let parsed: DatabasesResponse =
            serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(parsed.databases)
    }

    /// Mints a short-lived token for the WebSocket handshake.
    pub fn websocket_token(&self) -> Result<String> {
        let body = self.post("/v1/identity/websocket-token", None)?;
        let parsed: WebSocketTokenResponse =
            serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(parsed.token)
    }

    // =========================================================================
    // Database
    // =========================================================================

    /// Calls a reducer over HTTP with JSON or BSATN args, returning the raw
    /// response body.
    pub fn call_reducer(&self, database: &str, reducer: &str, args: &[u8]) -> Result<Vec<u8>> {
        self.post(&format!("/v1/database/{database}/call/{reducer}"), Some(args))
    }

    /// Runs ad-hoc SQL, returning the raw response body.
    pub fn sql(&self, database: &str, query: &str) -> Result<Vec<u8>> {
        self.post(&format!("/v1/database/{database}/sql"), Some(query.as_bytes()))
    }

    /// Fetches database metadata as parsed JSON.
    pub fn database_info(&self, database: &str) -> Result<serde_json::Value> {
        let body = self.get(&format!("/v1/database/{database}"))?;
        serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Lists the registered names of a database.
    pub fn database_names(&self, database: &str) -> Result<Vec<String>> {
        let body = self.get(&format!("/v1/database/{database}/names"))?;
        let parsed: NamesResponse =
            serde_json::from_slice(&body).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(parsed.names)
    }

    /// Fetches the database's owning identity (hex string).
    pub fn database_identity(&self, database: &str) -> Result<String> {
        let body = self.get(&format!("/v1/database/{database}/identity"))?;
        String::from_utf8(body).map_err(|_| Error::InvalidResponse("identity not utf-8".into()))
    }

    /// Fetches the last `num_lines` log lines as text.
    pub fn logs(&self, database: &str, num_lines: u32) -> Result<String> {
        let body = self.get(&format!("/v1/database/{database}/logs?num_lines={num_lines}"))?;
        String::from_utf8(body).map_err(|_| Error::InvalidResponse("logs not utf-8".into()))
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Checks the server is reachable.
    pub fn ping(&self) -> Result<()> {
        self.get("/v1/ping").map(|_| ())
    }
}

// =============================================================================
// Plain-TCP Transport
// =============================================================================

/// Minimal HTTP/1.0 transport over `std::net::TcpStream`, enough for the
/// schema fetch and identity endpoints. HTTP/1.0 with `Connection: close`
/// keeps the response unframed: status line, headers, blank line, body to
/// EOF. Plain `http://` only; put a richer client behind [`HttpTransport`]
/// when you need TLS, pooling, or proxies.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpHttpTransport;

impl TcpHttpTransport {
    fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<&[u8]>,
        auth: Option<&str>,
    ) -> Result<HttpResponse> {
        use std::io::{Read, Write};

        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| Error::RequestFailed(format!("only http:// urls supported: {url}")))?;
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, format!("/{path}")),
            None => (rest, "/".to_string()),
        };

        let mut stream = std::net::TcpStream::connect(host)
            .map_err(|e| Error::ConnectionFailed(format!("{host}: {e}")))?;

        let mut request = format!("{method} {path} HTTP/1.0\r\nHost: {host}\r\n");
        if let Some(auth) = auth {
            request.push_str(&format!("Authorization: {auth}\r\n"));
        }
        if let Some(body) = body {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        request.push_str("Connection: close\r\n\r\n");

        stream.write_all(request.as_bytes())?;
        if let Some(body) = body {
            stream.write_all(body)?;
        }

        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;

        let header_end = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| Error::InvalidResponse("no header terminator".into()))?;
        let head = std::str::from_utf8(&response[..header_end])
            .map_err(|_| Error::InvalidResponse("non-utf8 response head".into()))?;
        let status_line = head
            .lines()
            .next()
            .ok_or_else(|| Error::InvalidResponse("empty response".into()))?;
        let status: u16 = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::InvalidResponse(format!("bad status line: {status_line}")))?;

        Ok(HttpResponse {
            status,
            body: response[header_end + 4..].to_vec(),
        })
    }
}

impl HttpTransport for TcpHttpTransport {
    fn get(&self, url: &str, auth: Option<&str>) -> Result<HttpResponse> {
        self.request("GET", url, None, auth)
    }

    fn post(&self, url: &str, body: Option<&[u8]>, auth: Option<&str>) -> Result<HttpResponse> {
        self.request("POST", url, body, auth)
    }
}

// =============================================================================
// Tests
// =============================================================================
