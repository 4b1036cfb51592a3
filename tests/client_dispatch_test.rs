mod common;

use std::sync::{Arc, Mutex};

use common::{
    initial_connection_frame, subscribe_applied_frame, test_schema, transaction_frame, user_bytes,
    RecordingHandler, ScriptedTransport,
};
use stdb_client::transport::TransportEvent;
use stdb_client::{AlgebraicValue, ConnectionState, DbClient, Encoder, Error, Field};

fn connected(
    frames: Vec<Vec<u8>>,
) -> (
    DbClient<RecordingHandler>,
    Arc<Mutex<Vec<String>>>,
    Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let (handler, events) = RecordingHandler::new();
    let (transport, sent) = ScriptedTransport::new(frames);
    let mut client = DbClient::new(test_schema(), handler);
    client.connect(Box::new(transport));
    (client, events, sent)
}

fn drain(client: &mut DbClient<RecordingHandler>) {
    while client.frame_tick().unwrap() {}
}

#[test]
fn initial_connection_authenticates_and_fires_once() {
    // E4: identity, connection id, and token reach the handler exactly as
    // sent, and the state machine lands in Authenticated.
    let identity = [0x5A; 32];
    let connection = [0x3C; 16];
    let frames = vec![initial_connection_frame(identity, connection, "tkn")];
    let (mut client, events, _) = connected(frames);

    assert!(client.frame_tick().unwrap());
    assert_eq!(client.state(), ConnectionState::Authenticated);
    assert_eq!(client.identity().unwrap().as_bytes(), &identity);
    assert_eq!(client.token().unwrap().as_str(), "tkn");

    let events = events.lock().unwrap();
    let connects: Vec<_> = events.iter().filter(|e| e.starts_with("connect")).collect();
    assert_eq!(connects.len(), 1);
    assert_eq!(
        *connects[0],
        format!("connect {} {} tkn", "5a".repeat(32), "3c".repeat(16))
    );
}

#[test]
fn callback_order_follows_arrival_and_emission_order() {
    let frames = vec![
        initial_connection_frame([1; 32], [2; 16], "t"),
        subscribe_applied_frame(1, 1, "users", &[user_bytes(1, "Alice"), user_bytes(2, "Bob")]),
        transaction_frame(
            "users",
            &[user_bytes(1, "Alicia"), user_bytes(3, "Cara")],
            &[user_bytes(1, "Alice"), user_bytes(2, "Bob")],
        ),
    ];
    let (mut client, events, _) = connected(frames);
    drain(&mut client);

    let events = events.lock().unwrap();
    let interesting: Vec<&str> = events
        .iter()
        .filter(|e| !e.starts_with("connect") && !e.starts_with("disconnect"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        interesting,
        [
            "insert users U32(1)",
            "insert users U32(2)",
            "subscribed users 2",
            "update users U32(1)",
            "insert users U32(3)",
            "delete users U32(2)",
        ]
    );

    assert_eq!(client.count("users"), 2);
}

#[test]
fn heartbeats_keep_the_loop_alive() {
    let (handler, _) = RecordingHandler::new();
    let (mut transport, _) = ScriptedTransport::new(vec![]);
    transport.push_event(TransportEvent::NoFrame);
    transport.push_event(TransportEvent::NoFrame);
    let mut client = DbClient::new(test_schema(), handler);
    client.connect(Box::new(transport));

    assert!(client.frame_tick().unwrap()); // heartbeat
    assert!(client.frame_tick().unwrap()); // heartbeat
    assert!(!client.frame_tick().unwrap()); // closed
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn subscription_error_reaches_handler_without_dropping_connection() {
    let mut enc = Encoder::new();
    enc.put_u8(3);
    enc.put_u8(0); // request id present
    enc.put_u32(11);
    enc.put_u32(4);
    enc.put_str("bad query").unwrap();
    let frames = vec![
        initial_connection_frame([1; 32], [2; 16], "t"),
        common::frame(enc.into_bytes()),
    ];
    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();
    client.frame_tick().unwrap();

    assert_eq!(client.state(), ConnectionState::Authenticated);
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e == "suberror Some(11) 4 bad query"));
}

#[test]
fn unsubscribe_applied_delivers_dropped_rows() {
    let mut enc = Encoder::new();
    enc.put_u8(2);
    enc.put_u32(5); // request id
    enc.put_u32(1); // query set id
    enc.put_u8(0); // rows present
    enc.put_u32(1); // one table
    enc.put_str("users").unwrap();
    enc.put_raw(&common::row_list_bytes(&[
        user_bytes(1, "a"),
        user_bytes(2, "b"),
    ]));
    let frames = vec![common::frame(enc.into_bytes())];
    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0], "unsubscribed 1 2");
}

#[test]
fn one_off_query_result_round_trips_rows() {
    let mut enc = Encoder::new();
    enc.put_u8(5);
    enc.put_u32(2);
    enc.put_u8(0); // rows
    enc.put_u32(1);
    enc.put_str("users").unwrap();
    enc.put_raw(&common::row_list_bytes(&[user_bytes(9, "q")]));
    let frames = vec![common::frame(enc.into_bytes())];
    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();

    let events = events.lock().unwrap();
    assert!(events[0].starts_with("query 2 Rows("));
    assert!(events[0].contains("users"));
}

#[test]
fn reducer_result_with_transaction_applies_rows_first() {
    let mut enc = Encoder::new();
    enc.put_u8(6);
    enc.put_u32(20);
    enc.put_i64(123);
    enc.put_u8(0); // ok
    enc.put_bytes(&[0xAB]).unwrap();
    enc.put_u32(1);
    enc.put_u32(1);
    enc.put_u32(1);
    enc.put_str("users").unwrap();
    enc.put_u32(1);
    enc.put_u8(0);
    enc.put_raw(&common::row_list_bytes(&[user_bytes(6, "via-reducer")]));
    enc.put_raw(&common::row_list_bytes(&[]));
    let frames = vec![common::frame(enc.into_bytes())];

    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0], "insert users U32(6)");
    assert!(events[1].starts_with("reducer 20 Ok"));
    drop(events);

    assert_eq!(
        client
            .find("users", &AlgebraicValue::U32(6))
            .unwrap()
            .unwrap()
            .field("name")
            .unwrap()
            .value,
        AlgebraicValue::String("via-reducer".into())
    );
}

#[test]
fn malformed_frame_reports_on_error_and_connection_survives() {
    let frames = vec![
        initial_connection_frame([1; 32], [2; 16], "t"),
        vec![0x00, 0x63], // unknown message tag 0x63
        transaction_frame("users", &[user_bytes(1, "after")], &[]),
    ];
    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();
    client.frame_tick().unwrap();
    client.frame_tick().unwrap();

    assert_eq!(client.state(), ConnectionState::Authenticated);
    assert_eq!(client.count("users"), 1);
    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| e.starts_with("error") && e.contains("unknown server message tag")));
}

#[test]
fn outgoing_requests_use_strictly_increasing_ids() {
    let (mut client, _, sent) = connected(vec![]);
    client.subscribe(vec!["SELECT * FROM users".into()]).unwrap();
    client.one_off_query("SELECT 1").unwrap();
    client
        .call_reducer(
            "rename",
            &[
                Field::named("id", AlgebraicValue::U32(1)),
                Field::named("to", AlgebraicValue::String("n".into())),
            ],
        )
        .unwrap();

    let sent = sent.lock().unwrap();
    let rid = |bytes: &[u8]| u32::from_le_bytes(bytes[1..5].try_into().unwrap());
    assert_eq!(rid(&sent[0]), 1);
    assert_eq!(rid(&sent[1]), 2);
    assert_eq!(rid(&sent[2]), 3);
}

#[test]
fn operations_fail_without_transport() {
    let (handler, _) = RecordingHandler::new();
    let mut client = DbClient::new(test_schema(), handler);
    assert!(matches!(
        client.one_off_query("SELECT 1"),
        Err(Error::NotConnected)
    ));
    assert!(matches!(client.frame_tick(), Err(Error::NotConnected)));
}

#[test]
fn close_suppresses_further_events() {
    let frames = vec![initial_connection_frame([1; 32], [2; 16], "t")];
    let (mut client, events, _) = connected(frames);
    client.frame_tick().unwrap();
    events.lock().unwrap().clear();

    client.close();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn run_threaded_drains_and_returns_cache() {
    let frames = vec![
        initial_connection_frame([1; 32], [2; 16], "t"),
        subscribe_applied_frame(1, 1, "users", &[user_bytes(1, "bg")]),
    ];
    let (client, events, _) = connected(frames);
    let handle = client.run_threaded();
    let client = handle.join();

    assert_eq!(client.count("users"), 1);
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| e.starts_with("disconnect")));
}
