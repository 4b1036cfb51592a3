#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use stdb_client::transport::{Transport, TransportEvent};
use stdb_client::{
    AlgebraicValue, AuthToken, ConnectionId, Encoder, EventHandler, Field, Identity, QuerySetId,
    ReducerStatus, RequestId, Result, Row, RowList, Schema, SizeHint, TableRowSet,
};

/// Schema used across the integration suite: one PK table, one PK-less
/// table, one reducer.
pub fn test_schema() -> Schema {
    Schema::from_json(
        br#"{ "tables": [
            { "name": "users",
              "columns": [ { "name": "id", "type": "u32" },
                           { "name": "name", "type": "string" } ],
              "primary_key": [0] },
            { "name": "log",
              "columns": [ { "name": "line", "type": "string" } ] }
        ],
        "reducers": [
            { "name": "rename",
              "params": [ { "name": "id", "type": "u32" },
                          { "name": "to", "type": "string" } ] }
        ] }"#,
    )
    .expect("fixture schema parses")
}

/// Encodes one `users` row.
pub fn user_bytes(id: u32, name: &str) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_u32(id);
    enc.put_str(name).unwrap();
    enc.into_bytes()
}

/// Builds the fixture's `users` row as a decoded value.
pub fn user_row(id: u32, name: &str) -> Row {
    Row::new(vec![
        Field::named("id", AlgebraicValue::U32(id)),
        Field::named("name", AlgebraicValue::String(name.to_string())),
    ])
}

/// Encodes an offset-table row list (hint + length-prefixed payload).
pub fn row_list_bytes(rows: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for row in rows {
        offsets.extend_from_slice(&(data.len() as u64).to_le_bytes());
        data.extend_from_slice(row);
    }
    let mut enc = Encoder::new();
    RowList::from_parts(
        SizeHint::OffsetTable {
            count: rows.len() as u32,
            offsets: &offsets,
        },
        &data,
    )
    .encode(&mut enc)
    .unwrap();
    enc.into_bytes()
}

/// Wraps an inner server message in the uncompressed envelope.
pub fn frame(inner: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend_from_slice(&inner);
    out
}

/// Builds an `initial_connection` frame.
pub fn initial_connection_frame(identity: [u8; 32], connection: [u8; 16], token: &str) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_u8(0);
    enc.put_raw(&identity);
    enc.put_raw(&connection);
    enc.put_str(token).unwrap();
    frame(enc.into_bytes())
}

/// Builds a `subscribe_applied` frame for one table.
pub fn subscribe_applied_frame(
    request_id: u32,
    query_set_id: u32,
    table: &str,
    rows: &[Vec<u8>],
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_u8(1);
    enc.put_u32(request_id);
    enc.put_u32(query_set_id);
    enc.put_u32(1);
    enc.put_str(table).unwrap();
    enc.put_raw(&row_list_bytes(rows));
    frame(enc.into_bytes())
}

/// Builds a `transaction_update` frame with one persistent group for one
/// table.
pub fn transaction_frame(table: &str, inserts: &[Vec<u8>], deletes: &[Vec<u8>]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_u8(4);
    enc.put_u32(1);
    enc.put_u32(1);
    enc.put_u32(1);
    enc.put_str(table).unwrap();
    enc.put_u32(1);
    enc.put_u8(0);
    enc.put_raw(&row_list_bytes(inserts));
    enc.put_raw(&row_list_bytes(deletes));
    frame(enc.into_bytes())
}

/// Scripted transport: hands out queued frames, then reports closed; sends
/// are recorded for inspection.
pub struct ScriptedTransport {
    incoming: VecDeque<TransportEvent>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn new(frames: Vec<Vec<u8>>) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                incoming: frames.into_iter().map(TransportEvent::Frame).collect(),
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }

    /// Queues a non-frame event (heartbeat, closed) at the back.
    pub fn push_event(&mut self, event: TransportEvent) {
        self.incoming.push_back(event);
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<TransportEvent> {
        Ok(self.incoming.pop_front().unwrap_or(TransportEvent::Closed))
    }

    fn close(&mut self) {}
}

/// Handler that records every callback as one line of text, in order.
#[derive(Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: Arc::clone(&events),
            },
            events,
        )
    }

    fn push(&self, line: String) {
        self.events.lock().unwrap().push(line);
    }
}

impl EventHandler for RecordingHandler {
    fn on_connect(&mut self, identity: &Identity, connection_id: &ConnectionId, token: &AuthToken) {
        self.push(format!(
            "connect {} {} {}",
            identity.to_hex(),
            connection_id,
            token
        ));
    }
    fn on_disconnect(&mut self, reason: &str) {
        self.push(format!("disconnect {reason}"));
    }
    fn on_subscribe_applied(&mut self, table: &str, count: usize) {
        self.push(format!("subscribed {table} {count}"));
    }
    fn on_unsubscribe_applied(&mut self, query_set_id: QuerySetId, rows: Option<&[TableRowSet]>) {
        let row_count: usize = rows
            .map(|sets| sets.iter().map(|s| s.rows.len()).sum())
            .unwrap_or(0);
        self.push(format!("unsubscribed {query_set_id} {row_count}"));
    }
    fn on_insert(&mut self, table: &str, row: &Row) {
        self.push(format!("insert {table} {:?}", row.fields[0].value));
    }
    fn on_delete(&mut self, table: &str, row: &Row) {
        self.push(format!("delete {table} {:?}", row.fields[0].value));
    }
    fn on_update(&mut self, table: &str, _old: &Row, new: &Row) {
        self.push(format!("update {table} {:?}", new.fields[0].value));
    }
    fn on_reducer_result(&mut self, request_id: RequestId, status: &ReducerStatus, _timestamp: i64) {
        self.push(format!("reducer {request_id} {status:?}"));
    }
    fn on_query_result(&mut self, request_id: RequestId, result: &stdb_client::QueryResult) {
        self.push(format!("query {request_id} {result:?}"));
    }
    fn on_subscription_error(
        &mut self,
        request_id: Option<RequestId>,
        query_set_id: QuerySetId,
        message: &str,
    ) {
        self.push(format!(
            "suberror {:?} {query_set_id} {message}",
            request_id.map(|r| r.as_raw())
        ));
    }
    fn on_error(&mut self, message: &str) {
        self.push(format!("error {message}"));
    }
}
