// Integration tests driving a StreamManager through an in-memory transport

use parking_lot::Mutex;
use rpc_stream::transport::{pair, Endpoint};
use rpc_stream::{
    err_status, BidiStream, ClientMessage, Error, Reply, ServerMessage, ServerStream, StreamId,
    StreamManager, COMPLETE_METHOD,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("info,rpc_stream=debug")
        .try_init();
}

/// Read the next envelope the manager wrote to the wire
async fn next_sent(endpoint: &mut Endpoint) -> ClientMessage {
    let raw = tokio::time::timeout(Duration::from_secs(5), endpoint.recv())
        .await
        .expect("Timeout waiting for outbound message")
        .expect("Outbound channel closed");
    ClientMessage::decode(&raw).unwrap()
}

async fn reply_data(endpoint: &Endpoint, id: StreamId, reply: Value) {
    let raw = ServerMessage::data(id, reply).encode().unwrap();
    endpoint.deliver(raw).await.unwrap();
}

async fn reply_complete(endpoint: &Endpoint, id: StreamId, reply: &Reply) {
    let raw = ServerMessage::completion(id, reply.to_wire())
        .encode()
        .unwrap();
    endpoint.deliver(raw).await.unwrap();
}

/// Full request / data / completion round over the manager.
#[tokio::test]
async fn test_ping_pong_round() {
    init_tracing();

    let (transport, mut endpoint) = pair(16);
    let manager = StreamManager::new(transport);

    let stream = manager.open("ping").unwrap();
    let (data_tx, mut data_rx) = tokio::sync::mpsc::unbounded_channel();
    stream.on_data(move |payload| {
        let _ = data_tx.send(payload.clone());
    });

    stream.send(json!({})).unwrap();
    let sent = next_sent(&mut endpoint).await;
    assert_eq!(sent.request_id, StreamId(1));
    assert_eq!(sent.method, "ping");

    endpoint
        .deliver(r#"{"requestId":1,"reply":"pong","complete":false}"#)
        .await
        .unwrap();
    let got = tokio::time::timeout(Duration::from_secs(5), data_rx.recv())
        .await
        .expect("Timeout waiting for data")
        .unwrap();
    assert_eq!(got, json!("pong"));

    endpoint
        .deliver(r#"{"requestId":1,"reply":{"ok":true},"complete":true}"#)
        .await
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for completion");
    assert!(result.is_ok());

    assert!(matches!(
        stream.send(json!({})),
        Err(Error::StreamCompleted(_))
    ));
    assert_eq!(manager.stream_count(), 0);

    manager.close();
}

/// Interleaved traffic for two streams keeps per-stream order and isolation.
#[tokio::test]
async fn test_interleaved_streams_stay_isolated() {
    init_tracing();

    let (transport, endpoint) = pair(64);
    let manager = StreamManager::new(transport);

    let a = manager.open("sub").unwrap();
    let b = manager.open("sub").unwrap();
    assert_ne!(a.id(), b.id());

    let a_seen = Arc::new(Mutex::new(Vec::new()));
    let b_seen = Arc::new(Mutex::new(Vec::new()));
    let s = a_seen.clone();
    a.on_data(move |p| s.lock().push(p.clone()));
    let s = b_seen.clone();
    b.on_data(move |p| s.lock().push(p.clone()));

    for i in 0..20 {
        reply_data(&endpoint, a.id(), json!(i)).await;
        if i % 3 == 0 {
            reply_data(&endpoint, b.id(), json!(-i)).await;
        }
    }
    let done = Reply::ok(Value::Null);
    reply_complete(&endpoint, a.id(), &done).await;
    reply_complete(&endpoint, b.id(), &done).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        a.completion().await;
        b.completion().await;
    })
    .await
    .expect("Timeout waiting for both completions");

    let expected_a: Vec<_> = (0..20).map(|i| json!(i)).collect();
    let expected_b: Vec<_> = (0..20).filter(|i| i % 3 == 0).map(|i| json!(-i)).collect();
    assert_eq!(*a_seen.lock(), expected_a);
    assert_eq!(*b_seen.lock(), expected_b);
}

/// Connection close fails every open stream exactly once.
#[tokio::test]
async fn test_close_fails_every_stream_once() {
    init_tracing();

    let (transport, endpoint) = pair(16);
    let manager = StreamManager::new(transport);

    let streams: Vec<_> = (0..2).map(|_| manager.open("sub").unwrap()).collect();
    let calls = Arc::new(AtomicUsize::new(0));
    for stream in &streams {
        let c = calls.clone();
        stream.on_completion(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
    }

    endpoint.close("network lost").await.unwrap();
    // A second close is a no-op
    let _ = endpoint.close("network lost").await;

    for stream in &streams {
        let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
            .await
            .expect("Timeout waiting for close completion");
        assert_eq!(result, err_status("network lost"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!manager.is_alive());
    assert!(matches!(manager.open("sub"), Err(Error::ConnectionClosed)));
}

/// Local complete() only half-closes; the stream waits for the peer.
#[tokio::test]
async fn test_half_close_waits_for_peer() {
    init_tracing();

    let (transport, mut endpoint) = pair(16);
    let manager = StreamManager::new(transport);
    let stream = manager.open("upload").unwrap();

    stream.send(json!("chunk-1")).unwrap();
    stream.complete(&Reply::ok(json!("eof"))).unwrap();

    let first = next_sent(&mut endpoint).await;
    let done = next_sent(&mut endpoint).await;
    assert_eq!(first.args, json!("chunk-1"));
    assert_eq!(done.method, COMPLETE_METHOD);
    assert_eq!(
        Reply::from_wire(&done.args).unwrap(),
        Reply::ok(json!("eof"))
    );
    assert!(!stream.is_completed());

    let done = Reply::ok(json!({"bytes": 7}));
    reply_complete(&endpoint, stream.id(), &done).await;
    let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for completion");
    assert_eq!(result.value(), Some(&json!({"bytes": 7})));
}

/// Malformed inbound text is dropped without disturbing open streams.
#[tokio::test]
async fn test_malformed_message_is_dropped() {
    init_tracing();

    let (transport, endpoint) = pair(16);
    let manager = StreamManager::new(transport);
    let stream = manager.open("sub").unwrap();

    endpoint.deliver("not json at all").await.unwrap();
    let done = Reply::ok(json!(1));
    reply_complete(&endpoint, stream.id(), &done).await;

    let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for completion");
    assert_eq!(result, Reply::ok(json!(1)));
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Echo {
    text: String,
}

/// Typed bidi stream against an echoing peer task.
#[tokio::test]
async fn test_typed_bidi_echo() {
    init_tracing();

    let (transport, mut endpoint) = pair(16);
    let manager = StreamManager::new(transport);

    // Peer echoes each message and completes when the client completes
    let peer = tokio::spawn(async move {
        while let Some(raw) = endpoint.recv().await {
            let msg = ClientMessage::decode(&raw).unwrap();
            if msg.is_complete() {
                let done = Reply::ok(json!("bye"));
                reply_complete(&endpoint, msg.request_id, &done).await;
                break;
            }
            reply_data(&endpoint, msg.request_id, msg.args).await;
        }
        endpoint
    });

    let stream: BidiStream<Echo, Echo> = manager.open_bidi("echo").unwrap();
    let echoed = Arc::new(Mutex::new(Vec::new()));
    let e = echoed.clone();
    stream.on_message(move |m| e.lock().push(m));

    for text in ["a", "b", "c"] {
        stream
            .send(&Echo {
                text: text.to_string(),
            })
            .unwrap();
    }
    stream.complete(&Reply::ok(Value::Null)).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for completion");
    assert_eq!(result, Reply::ok(json!("bye")));

    let texts: Vec<_> = echoed.lock().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    let _endpoint = peer.await.unwrap();
}

/// Server stream sends its request once and receives pushes.
#[tokio::test]
async fn test_server_stream_push() {
    init_tracing();

    let (transport, mut endpoint) = pair(16);
    let manager = StreamManager::new(transport);

    let stream: ServerStream<u32> = manager
        .open_server_stream("count", &json!({"to": 3}))
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    stream.on_message(move |n| s.lock().push(n));

    let request = next_sent(&mut endpoint).await;
    assert_eq!(request.method, "count");
    assert_eq!(request.args, json!({"to": 3}));

    for n in 1..=3 {
        reply_data(&endpoint, stream.id(), json!(n)).await;
    }
    let done = Reply::ok(Value::Null);
    reply_complete(&endpoint, stream.id(), &done).await;

    tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for completion");
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
}

/// Dropping the manager fails streams that are still open.
#[tokio::test]
async fn test_drop_manager_fails_open_streams() {
    init_tracing();

    let (transport, _endpoint) = pair(16);
    let manager = StreamManager::new(transport);
    let stream = manager.open("sub").unwrap();

    drop(manager);
    let result = tokio::time::timeout(Duration::from_secs(5), stream.completion())
        .await
        .expect("Timeout waiting for shutdown completion");
    assert!(result.is_err());
}
