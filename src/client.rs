//! # High-Level Client
//!
//! [`DbClient`] is the orchestrator: it owns the schema, the cache, the
//! connection state machine, and the transport, and it turns incoming
//! frames into application callbacks.
//!
//! ## Data Flow
//!
//! ```text
//!                    subscribe / call_reducer
//!  application ──────────────────────────────────────► transport ──► server
//!
//!  server ──► transport ──► frame_tick ──► process_frame
//!                                             │
//!                               ┌─────────────┼──────────────┐
//!                               ▼             ▼              ▼
//!                        decompress      ServerMessage    cache apply
//!                         envelope         decode        (change list)
//!                                             │              │
//!                                             └──────┬───────┘
//!                                                    ▼
//!                                             EventHandler callbacks
//! ```
//!
//! ## Delivery Styles
//!
//! Two ways to drive the receive loop, both invoking the same handler:
//!
//! - **Caller-driven polling**: call [`DbClient::frame_tick`] from your own
//!   loop. One tick awaits one transport event.
//! - **Owned background loop**: [`DbClient::run_threaded`] moves the client
//!   onto a dedicated thread that ticks until disconnect, handing the
//!   client back on join.
//!
//! The cache and subscription map are touched only by whichever thread
//! drives the loop; cross-thread readers snapshot via `get_all`/`get_typed`
//! (which return fresh owned values) from inside callbacks.
//!
//! ## Callback Ordering
//!
//! Row callbacks fire in the exact order the cache emitted changes. When a
//! reducer outcome embeds a transaction, all of that transaction's row
//! callbacks fire before `on_reducer_result`. Across frames, callbacks
//! follow arrival order.

use std::collections::HashMap;
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::cache::{Change, ClientCache};
use crate::codec::{encode_product_fields, Encoder};
use crate::connection::{connect_url, Connection, ConnectionConfig, ConnectionState};
use crate::creds;
use crate::error::{Error, Result};
use crate::protocol::{
    decompress_frame, ClientMessage, Decompressor, NoDecompression, OneOffResult,
    ProcedureStatus, QueryRows, ReducerOutcome, ServerMessage,
    UNSUBSCRIBE_FLAG_SEND_DROPPED_ROWS,
};
use crate::rows::{decode_rows, FromRow, Row};
use crate::schema::Schema;
use crate::transport::{Transport, TransportEvent, WsTransport};
use crate::types::{AlgebraicValue, AuthToken, ConnectionId, Field, Identity, QuerySetId, RequestId};

// =============================================================================
// Handler-Facing Types
// =============================================================================

/// One table's decoded rows, as handed to query-result and
/// unsubscribe callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRowSet {
    /// The table the rows belong to.
    pub table: String,
    /// The decoded rows.
    pub rows: Vec<Row>,
}

/// Owned result of a one-off query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// The query produced rows.
    Rows(Vec<TableRowSet>),
    /// The query failed server-side.
    Error(String),
}

/// Owned outcome of a reducer call, with any embedded transaction already
/// applied to the cache by the time the callback fires.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerStatus {
    /// The reducer returned a BSATN payload.
    Ok(Vec<u8>),
    /// Success with nothing to report.
    OkEmpty,
    /// The reducer failed with an application payload.
    Err(Vec<u8>),
    /// The host failed running the reducer.
    InternalError(String),
}

// =============================================================================
// Event Handler
// =============================================================================

/// The capability set the application provides. Every callback is optional:
/// default implementations do nothing, so handlers implement only what they
/// observe.
pub trait EventHandler: Send {
    /// Credentials arrived; the connection is authenticated.
    fn on_connect(&mut self, identity: &Identity, connection_id: &ConnectionId, token: &AuthToken) {
        let _ = (identity, connection_id, token);
    }

    /// The connection ended (transport error or server close).
    fn on_disconnect(&mut self, reason: &str) {
        let _ = reason;
    }

    /// A subscription's initial rows for one table finished applying.
    fn on_subscribe_applied(&mut self, table: &str, count: usize) {
        let _ = (table, count);
    }

    /// An unsubscribe completed, optionally carrying the dropped rows.
    fn on_unsubscribe_applied(&mut self, query_set_id: QuerySetId, rows: Option<&[TableRowSet]>) {
        let _ = (query_set_id, rows);
    }

    /// A row became live in the cache.
    fn on_insert(&mut self, table: &str, row: &Row) {
        let _ = (table, row);
    }

    /// A row left the cache.
    fn on_delete(&mut self, table: &str, row: &Row) {
        let _ = (table, row);
    }

    /// A row was replaced under the same primary key.
    fn on_update(&mut self, table: &str, old: &Row, new: &Row) {
        let _ = (table, old, new);
    }

    /// A reducer call finished. Any embedded transaction's row callbacks
    /// have already fired.
    fn on_reducer_result(&mut self, request_id: RequestId, status: &ReducerStatus, timestamp: i64) {
        let _ = (request_id, status, timestamp);
    }

    /// A procedure call finished.
    fn on_procedure_result(
        &mut self,
        request_id: RequestId,
        status: &ProcedureStatus,
        timestamp: i64,
        host_duration: i64,
    ) {
        let _ = (request_id, status, timestamp, host_duration);
    }

    /// A one-off query finished.
    fn on_query_result(&mut self, request_id: RequestId, result: &QueryResult) {
        let _ = (request_id, result);
    }

    /// A subscription failed, at subscribe time or later.
    fn on_subscription_error(
        &mut self,
        request_id: Option<RequestId>,
        query_set_id: QuerySetId,
        message: &str,
    ) {
        let _ = (request_id, query_set_id, message);
    }

    /// A frame failed to decode or apply; the frame was dropped and the
    /// connection stays up.
    fn on_error(&mut self, message: &str) {
        let _ = message;
    }
}

/// Handler that ignores everything; useful for write-only clients and
/// tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl EventHandler for NullHandler {}

// =============================================================================
// DbClient
// =============================================================================

/// The high-level client. See the module docs for the threading model.
pub struct DbClient<H: EventHandler> {
    schema: Schema,
    cache: ClientCache,
    conn: Connection,
    transport: Option<Box<dyn Transport>>,
    handler: H,
    subscriptions: HashMap<QuerySetId, Vec<String>>,
    decompressor: Box<dyn Decompressor + Send>,
    /// Host and database of the last `connect_ws`, for reconnects.
    target: Option<(String, String)>,
}

impl<H: EventHandler> DbClient<H> {
    /// Creates a client with the default configuration.
    pub fn new(schema: Schema, handler: H) -> Self {
        Self::with_config(schema, handler, ConnectionConfig::default())
    }

    /// Creates a client with explicit connection tunables.
    pub fn with_config(schema: Schema, handler: H, config: ConnectionConfig) -> Self {
        Self {
            schema,
            cache: ClientCache::new(),
            conn: Connection::new(config),
            transport: None,
            handler,
            subscriptions: HashMap::new(),
            decompressor: Box::new(NoDecompression),
            target: None,
        }
    }

    /// Installs a decompression collaborator for `Brotli`/`Gzip` envelopes.
    pub fn set_decompressor(&mut self, decompressor: Box<dyn Decompressor + Send>) {
        self.decompressor = decompressor;
    }

    /// Presents a bearer token on subsequent connects (e.g. loaded via
    /// [`creds::load`]).
    pub fn set_token(&mut self, token: AuthToken) {
        self.conn.set_token(token);
    }

    // =========================================================================
    // Connecting
    // =========================================================================

    /// Attaches an already-open transport. Resets the reconnect counter.
    pub fn connect(&mut self, transport: Box<dyn Transport>) {
        self.conn.begin_connect();
        self.transport = Some(transport);
        self.conn.transport_opened();
    }

    /// Opens the real WebSocket transport to `host`/`database` and attaches
    /// it. The target is remembered for [`DbClient::reconnect`].
    pub fn connect_ws(&mut self, host: &str, database: &str) -> Result<()> {
        self.conn.begin_connect();
        let url = connect_url(host, database, self.conn.config().compression);
        let transport = match WsTransport::connect(
            &url,
            self.conn.token(),
            self.conn.config().handshake_timeout,
        ) {
            Ok(t) => t,
            Err(e) => {
                self.conn.record_disconnect();
                return Err(e);
            }
        };
        self.transport = Some(Box::new(transport));
        self.conn.transport_opened();
        self.target = Some((host.to_string(), database.to_string()));
        info!(host, database, "connected");
        Ok(())
    }

    /// Reconnects to the last `connect_ws` target after the backoff delay,
    /// then resubscribes every active query set under its existing id.
    ///
    /// Fails fast when the attempt budget is exhausted or the client never
    /// connected via `connect_ws`.
    pub fn reconnect(&mut self) -> Result<()> {
        let (host, database) = self
            .target
            .clone()
            .ok_or_else(|| Error::ConnectionFailed("no previous connect target".into()))?;
        if !self.conn.should_reconnect() {
            return Err(Error::ConnectionFailed(format!(
                "reconnect attempts exhausted ({})",
                self.conn.reconnect_attempts()
            )));
        }
        // Attempt n (n starting at 0 after each successful connect) waits
        // base * (n + 1); the attempt is spent only once the delay has been
        // served and the dial begins.
        let delay = self.conn.next_backoff();
        debug!(?delay, "backing off before reconnect");
        std::thread::sleep(delay);
        self.conn.consume_reconnect_attempt();
        self.connect_ws(&host, &database)?;

        // Resubscribe active query sets under their existing ids so the
        // application's handles stay valid across the reconnect.
        let subscriptions: Vec<(QuerySetId, Vec<String>)> = self
            .subscriptions
            .iter()
            .map(|(id, queries)| (*id, queries.clone()))
            .collect();
        for (query_set_id, queries) in subscriptions {
            let request_id = self.conn.next_request_id();
            self.send_message(&ClientMessage::Subscribe {
                request_id,
                query_set_id,
                queries,
            })?;
        }
        Ok(())
    }

    /// Closes the connection deliberately. No further events are emitted.
    pub fn close(&mut self) {
        self.conn.begin_close();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.conn.closed();
    }

    // =========================================================================
    // Outgoing Operations
    // =========================================================================

    fn send_message(&mut self, message: &ClientMessage) -> Result<()> {
        let sendable = matches!(
            self.conn.state(),
            ConnectionState::Connected | ConnectionState::Authenticated
        );
        if !sendable {
            return Err(Error::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport.send(&message.encode()?)
    }

    /// Subscribes a set of queries, returning the id that addresses the set
    /// from now on.
    pub fn subscribe(&mut self, queries: Vec<String>) -> Result<QuerySetId> {
        let request_id = self.conn.next_request_id();
        let query_set_id = self.conn.next_query_set_id();
        self.send_message(&ClientMessage::Subscribe {
            request_id,
            query_set_id,
            queries: queries.clone(),
        })?;
        self.subscriptions.insert(query_set_id, queries);
        Ok(query_set_id)
    }

    /// Drops a query set. `send_dropped_rows` asks the server to return the
    /// rows the subscription was holding.
    pub fn unsubscribe(
        &mut self,
        query_set_id: QuerySetId,
        send_dropped_rows: bool,
    ) -> Result<RequestId> {
        let request_id = self.conn.next_request_id();
        self.send_message(&ClientMessage::Unsubscribe {
            request_id,
            query_set_id,
            flags: if send_dropped_rows {
                UNSUBSCRIBE_FLAG_SEND_DROPPED_ROWS
            } else {
                0
            },
        })?;
        Ok(request_id)
    }

    /// Runs one query outside any subscription.
    pub fn one_off_query(&mut self, sql: &str) -> Result<RequestId> {
        let request_id = self.conn.next_request_id();
        self.send_message(&ClientMessage::OneOffQuery {
            request_id,
            query: sql.to_string(),
        })?;
        Ok(request_id)
    }

    /// Invokes a reducer with pre-encoded BSATN arguments.
    pub fn call_reducer_raw(&mut self, name: &str, args: Vec<u8>) -> Result<RequestId> {
        let request_id = self.conn.next_request_id();
        self.send_message(&ClientMessage::CallReducer {
            request_id,
            reducer: name.to_string(),
            args,
        })?;
        Ok(request_id)
    }

    /// Invokes a reducer from named fields, encoded against the reducer's
    /// parameter columns. An unknown reducer fails synchronously.
    pub fn call_reducer(&mut self, name: &str, fields: &[Field]) -> Result<RequestId> {
        let params = self
            .schema
            .reducer(name)
            .ok_or_else(|| Error::UnknownReducer(name.to_string()))?
            .params
            .clone();
        let mut enc = Encoder::new();
        encode_product_fields(&mut enc, &params, fields)?;
        self.call_reducer_raw(name, enc.into_bytes())
    }

    /// Invokes a procedure with pre-encoded BSATN arguments.
    pub fn call_procedure_raw(&mut self, name: &str, args: Vec<u8>) -> Result<RequestId> {
        let request_id = self.conn.next_request_id();
        self.send_message(&ClientMessage::CallProcedure {
            request_id,
            procedure: name.to_string(),
            args,
        })?;
        Ok(request_id)
    }

    // =========================================================================
    // Cache Views
    // =========================================================================

    /// Fresh owned snapshot of every row in a table.
    pub fn get_all(&self, table: &str) -> Vec<Row> {
        self.cache.get_all(table)
    }

    /// Number of live rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.cache.count(table)
    }

    /// Looks up one row by primary-key value.
    pub fn find(&self, table: &str, pk: &AlgebraicValue) -> Result<Option<Row>> {
        self.cache.find(table, pk)
    }

    /// Snapshot of a table converted into application records.
    pub fn get_typed<T: FromRow>(&self, table: &str) -> Result<Vec<T>> {
        self.cache.get_all(table).iter().map(T::from_row).collect()
    }

    /// Primary-key lookup converted into an application record.
    pub fn find_typed<T: FromRow>(&self, table: &str, pk: &AlgebraicValue) -> Result<Option<T>> {
        match self.cache.find(table, pk)? {
            Some(row) => Ok(Some(T::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// The schema this client runs against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// The identity received at authentication, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.conn.identity()
    }

    /// The bearer token for this or a future connection.
    pub fn token(&self) -> Option<&AuthToken> {
        self.conn.token()
    }

    /// Saves the authenticated identity and token for `database` under
    /// `dir`, for presentation on a later run.
    pub fn save_credentials(&self, dir: &std::path::Path, database: &str) -> Result<()> {
        let (Some(identity), Some(token)) = (self.conn.identity(), self.conn.token()) else {
            return Err(Error::NotConnected);
        };
        creds::save(
            dir,
            database,
            &creds::Credentials {
                identity: identity.to_hex(),
                token: token.as_str().to_string(),
            },
        )
    }

    // =========================================================================
    // Receive Path
    // =========================================================================

    /// Drives one frame through envelope stripping, message decode, cache
    /// application, and handler dispatch.
    ///
    /// Everything decoded from the frame is materialized into owned values
    /// before this returns; no borrow of `frame` escapes.
    pub fn process_frame(&mut self, frame: &[u8]) -> Result<()> {
        let payload = decompress_frame(frame, self.decompressor.as_ref())?;
        let message = ServerMessage::decode(&payload)?;
        self.dispatch(message)
    }

    /// Awaits one transport event and processes it.
    ///
    /// Returns `Ok(true)` while the connection lives. Decode and apply
    /// failures are reported via `on_error` and the frame dropped, per the
    /// error taxonomy; only transport-level trouble ends the loop, with
    /// `on_disconnect` and `Ok(false)`.
    pub fn frame_tick(&mut self) -> Result<bool> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        match transport.recv() {
            Ok(TransportEvent::Frame(frame)) => {
                if let Err(e) = self.process_frame(&frame) {
                    error!(error = %e, "dropping undecodable frame");
                    self.handler.on_error(&e.to_string());
                }
                Ok(true)
            }
            Ok(TransportEvent::NoFrame) => Ok(true),
            Ok(TransportEvent::Closed) => {
                self.transport = None;
                self.conn.record_disconnect();
                self.handler.on_disconnect("connection closed by server");
                Ok(false)
            }
            Err(e) => {
                self.transport = None;
                self.conn.record_disconnect();
                self.handler.on_disconnect(&e.to_string());
                Ok(false)
            }
        }
    }

    /// Moves the client onto a dedicated consumer thread that ticks until
    /// disconnect. The handle returns the client (cache included) on join.
    pub fn run_threaded(mut self) -> ClientHandle<H>
    where
        H: 'static,
    {
        let join = std::thread::spawn(move || {
            loop {
                match self.frame_tick() {
                    Ok(true) => continue,
                    Ok(false) | Err(_) => break,
                }
            }
            self
        });
        ClientHandle { join }
    }

    fn dispatch(&mut self, message: ServerMessage<'_>) -> Result<()> {
        match message {
            ServerMessage::InitialConnection {
                identity,
                connection_id,
                token,
            } => {
                self.conn.authenticate(identity, connection_id, token.clone());
                self.handler.on_connect(&identity, &connection_id, &token);
            }
            ServerMessage::SubscribeApplied {
                request_id,
                query_set_id,
                rows,
            } => {
                debug!(%request_id, %query_set_id, "subscription applied");
                let counts: Vec<(String, usize)> = rows
                    .tables
                    .iter()
                    .filter(|t| self.schema.table(&t.table_name).is_some())
                    .map(|t| (t.table_name.clone(), t.rows.len()))
                    .collect();
                let changes = self.cache.apply_subscribe_applied(&self.schema, &rows)?;
                self.dispatch_changes(changes);
                for (table, count) in counts {
                    self.handler.on_subscribe_applied(&table, count);
                }
            }
            ServerMessage::UnsubscribeApplied {
                request_id,
                query_set_id,
                rows,
            } => {
                debug!(%request_id, %query_set_id, "unsubscribe applied");
                self.subscriptions.remove(&query_set_id);
                let dropped = match rows {
                    Some(rows) => Some(self.decode_table_sets(&rows)?),
                    None => None,
                };
                self.handler
                    .on_unsubscribe_applied(query_set_id, dropped.as_deref());
            }
            ServerMessage::SubscriptionError {
                request_id,
                query_set_id,
                error,
            } => {
                warn!(%query_set_id, error, "subscription error");
                self.handler
                    .on_subscription_error(request_id, query_set_id, &error);
            }
            ServerMessage::TransactionUpdate { updates } => {
                let changes = self.cache.apply_transaction_update(&self.schema, &updates)?;
                self.dispatch_changes(changes);
            }
            ServerMessage::OneOffQueryResult { request_id, result } => {
                let owned = match result {
                    OneOffResult::Rows(rows) => QueryResult::Rows(self.decode_table_sets(&rows)?),
                    OneOffResult::Error(message) => QueryResult::Error(message),
                };
                self.handler.on_query_result(request_id, &owned);
            }
            ServerMessage::ReducerResult {
                request_id,
                timestamp,
                outcome,
            } => {
                let status = match outcome {
                    ReducerOutcome::Ok {
                        return_value,
                        transaction,
                    } => {
                        // The embedded transaction is applied exactly as a
                        // standalone transaction_update; its row callbacks
                        // fire before the reducer result below.
                        let changes = self
                            .cache
                            .apply_transaction_update(&self.schema, &transaction)?;
                        self.dispatch_changes(changes);
                        ReducerStatus::Ok(return_value.to_vec())
                    }
                    ReducerOutcome::OkEmpty => ReducerStatus::OkEmpty,
                    ReducerOutcome::Err(payload) => ReducerStatus::Err(payload.to_vec()),
                    ReducerOutcome::InternalError(message) => {
                        ReducerStatus::InternalError(message)
                    }
                };
                self.handler
                    .on_reducer_result(request_id, &status, timestamp);
            }
            ServerMessage::ProcedureResult {
                status,
                timestamp,
                host_duration,
                request_id,
            } => {
                self.handler
                    .on_procedure_result(request_id, &status, timestamp, host_duration);
            }
        }
        Ok(())
    }

    fn dispatch_changes(&mut self, changes: Vec<Change>) {
        for change in &changes {
            match change {
                Change::Insert { table, row } => self.handler.on_insert(table, row),
                Change::Delete { table, row } => self.handler.on_delete(table, row),
                Change::Update { table, old, new } => self.handler.on_update(table, old, new),
            }
        }
    }

    /// Decodes per-table row lists into owned rows, skipping tables the
    /// schema does not declare.
    fn decode_table_sets(&self, rows: &QueryRows<'_>) -> Result<Vec<TableRowSet>> {
        let mut sets = Vec::with_capacity(rows.tables.len());
        for table_rows in &rows.tables {
            let Some(decl) = self.schema.table(&table_rows.table_name) else {
                warn!(table = %table_rows.table_name, "rows for unknown table, skipping");
                continue;
            };
            sets.push(TableRowSet {
                table: table_rows.table_name.clone(),
                rows: decode_rows(&table_rows.rows, &decl.columns)?,
            });
        }
        Ok(sets)
    }
}

// =============================================================================
// Background Handle
// =============================================================================

/// Handle to a client running its own consumer thread.
pub struct ClientHandle<H: EventHandler> {
    join: JoinHandle<DbClient<H>>,
}

impl<H: EventHandler> ClientHandle<H> {
    /// True once the loop exited (disconnect or close).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop to exit and returns the client, cache intact.
    pub fn join(self) -> DbClient<H> {
        self.join.join().expect("client thread panicked")
    }
}

// =============================================================================
// Tests
// =============================================================================
