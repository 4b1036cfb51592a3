//! # Connection State Machine
//!
//! The lifecycle of one logical connection, from connect through
//! authentication to disconnect and backoff-governed reconnect. This module
//! is pure state: it owns no transport and performs no I/O, which is what
//! makes every transition directly testable. The high-level client drives
//! it from the receive loop.
//!
//! ## Transitions
//!
//! ```text
//! disconnected --connect--> connecting --transport open--> connected
//! connected --initial_connection frame--> authenticated
//! authenticated --any frame--> authenticated          (normal operation)
//! authenticated|connected --transport error/EOF--> disconnected
//! disconnected --should_reconnect--> connecting       (after backoff)
//! *        --close()--> closing --> disconnected
//! ```
//!
//! ## Request IDs
//!
//! Two monotonically increasing counters, both starting at 1: one per
//! client message that expects a reply, one per subscribed query set.
//! Neither wraps within a connection; at one allocation per nanosecond a
//! u32 lasts longer than any WebSocket connection ever has.
//!
//! ## Backoff
//!
//! Linear with a ceiling: the delay before reconnect attempt `n` is
//! `min(base * (n + 1), max)`. The attempt counter resets to zero on a
//! successful connect, and reconnection stops once the counter reaches the
//! configured maximum.

use std::time::Duration;

use tracing::{debug, info};

use crate::protocol::Compression;
use crate::types::{AuthToken, ConnectionId, Identity, QuerySetId, RequestId};

// =============================================================================
// Constants
// =============================================================================

/// Subprotocol token identifying the v2 BSATN protocol variant, sent in the
/// `Sec-WebSocket-Protocol` header.
pub const SUBPROTOCOL: &str = "v2.bsatn.spacetimedb";

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for connection lifecycle behavior.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base backoff delay; attempt `n` waits `base * (n + 1)`.
    pub base_backoff: Duration,
    /// Ceiling on the backoff delay.
    pub max_backoff: Duration,
    /// Reconnection stops once this many attempts have failed.
    pub max_reconnect_attempts: u32,
    /// Budget for the WebSocket handshake at connect time.
    pub handshake_timeout: Duration,
    /// Compression requested from the server in the connect URL.
    pub compression: Compression,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(5000),
            max_reconnect_attempts: 10,
            handshake_timeout: Duration::from_secs(10),
            compression: Compression::None,
        }
    }
}

// =============================================================================
// Backoff
// =============================================================================

/// The reconnect delay schedule: linear growth with a ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay.
    pub base: Duration,
    /// Ceiling.
    pub max: Duration,
}

impl BackoffPolicy {
    /// The delay before attempt `attempt` (zero-based):
    /// `min(base * (attempt + 1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self
            .base
            .checked_mul(attempt.saturating_add(1))
            .unwrap_or(self.max);
        scaled.min(self.max)
    }
}

// =============================================================================
// Id Allocation
// =============================================================================

/// Allocators for the two per-connection counters.
#[derive(Debug)]
pub struct RequestIds {
    next_request: u32,
    next_query_set: u32,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIds {
    /// Both counters start at 1.
    pub fn new() -> Self {
        Self {
            next_request: 1,
            next_query_set: 1,
        }
    }

    /// Allocates the next request id.
    pub fn next_request_id(&mut self) -> RequestId {
        let id = RequestId::from_raw(self.next_request);
        self.next_request += 1;
        id
    }

    /// Allocates the next query set id.
    pub fn next_query_set_id(&mut self) -> QuerySetId {
        let id = QuerySetId::from_raw(self.next_query_set);
        self.next_query_set += 1;
        id
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Discrete connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; the initial and terminal state.
    Disconnected,
    /// A connect is in flight.
    Connecting,
    /// The transport is open; waiting on `initial_connection`.
    Connected,
    /// Credentials received; normal operation.
    Authenticated,
    /// A deliberate close is in progress; no further events are emitted.
    Closing,
}

/// Connection lifecycle state: the current [`ConnectionState`], the
/// credentials received at authentication, the id allocators, and the
/// reconnect bookkeeping.
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    ids: RequestIds,
    identity: Option<Identity>,
    connection_id: Option<ConnectionId>,
    token: Option<AuthToken>,
    reconnect_attempts: u32,
    config: ConnectionConfig,
}

impl Connection {
    /// Creates a disconnected connection with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            ids: RequestIds::new(),
            identity: None,
            connection_id: None,
            token: None,
            reconnect_attempts: 0,
            config,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration this connection runs under.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The identity received on `initial_connection`, if authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The connection id received on `initial_connection`.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    /// The bearer token for this or a future connection.
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    /// Sets the token presented at connect time (e.g. loaded from the
    /// credentials file before the first connect).
    pub fn set_token(&mut self, token: AuthToken) {
        self.token = Some(token);
    }

    /// `disconnected → connecting`: a connect is starting.
    pub fn begin_connect(&mut self) {
        debug!(state = ?self.state, "begin connect");
        self.state = ConnectionState::Connecting;
    }

    /// `connecting → connected`: the transport opened. Resets the
    /// reconnect counter.
    pub fn transport_opened(&mut self) {
        info!("transport open");
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
    }

    /// `connected → authenticated`: the `initial_connection` frame arrived.
    /// Credentials are retained until teardown.
    pub fn authenticate(
        &mut self,
        identity: Identity,
        connection_id: ConnectionId,
        token: AuthToken,
    ) {
        info!(identity = %identity, "authenticated");
        self.identity = Some(identity);
        self.connection_id = Some(connection_id);
        self.token = Some(token);
        self.state = ConnectionState::Authenticated;
    }

    /// `* → disconnected` after a transport error or EOF.
    ///
    /// The attempt counter is untouched here: disconnecting costs nothing,
    /// only dialing does. [`Connection::consume_reconnect_attempt`] advances
    /// it when a reconnect is actually spent, so the first reconnect after a
    /// drop is attempt 0 and waits the base delay.
    pub fn record_disconnect(&mut self) {
        info!(attempts = self.reconnect_attempts, "disconnected");
        self.state = ConnectionState::Disconnected;
    }

    /// `* → closing`: a deliberate close started.
    pub fn begin_close(&mut self) {
        debug!("closing");
        self.state = ConnectionState::Closing;
    }

    /// `closing → disconnected`: the transport is gone.
    pub fn closed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Allocates the next request id.
    pub fn next_request_id(&mut self) -> RequestId {
        self.ids.next_request_id()
    }

    /// Allocates the next query set id.
    pub fn next_query_set_id(&mut self) -> QuerySetId {
        self.ids.next_query_set_id()
    }

    /// Number of reconnect attempts consumed since the last successful
    /// connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Spends one reconnect attempt. Called by the reconnect path once the
    /// backoff delay has been read, immediately before dialing; a failed
    /// dial then leaves the counter advanced for the next round.
    pub fn consume_reconnect_attempt(&mut self) {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
    }

    /// Whether another reconnect should be attempted: disconnected, with
    /// fewer than `max_reconnect_attempts` attempts consumed.
    ///
    /// `max_reconnect_attempts = N` therefore permits exactly N dials
    /// before the state machine stays `Disconnected`.
    pub fn should_reconnect(&self) -> bool {
        self.state == ConnectionState::Disconnected
            && self.reconnect_attempts < self.config.max_reconnect_attempts
    }

    /// The delay to wait before the next reconnect attempt: the backoff for
    /// the current counter value, so the first attempt after a drop waits
    /// `base`, the second `base * 2`, up to the ceiling.
    pub fn next_backoff(&self) -> Duration {
        BackoffPolicy {
            base: self.config.base_backoff,
            max: self.config.max_backoff,
        }
        .delay(self.reconnect_attempts)
    }
}

// =============================================================================
// URL Building
// =============================================================================

/// Builds the subscribe URL:
/// `ws://{host}/v1/database/{database}/subscribe?compression=...`.
///
/// `host` may carry its own scheme (`ws://` or `wss://`); a bare host gets
/// `ws://`.
pub fn connect_url(host: &str, database: &str, compression: Compression) -> String {
    let base = if host.starts_with("ws://") || host.starts_with("wss://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("ws://{}", host.trim_end_matches('/'))
    };
    format!(
        "{base}/v1/database/{database}/subscribe?compression={}",
        compression.query_param()
    )
}

// =============================================================================
// Tests
// =============================================================================
