//! Tests for the Peer against a hand-driven fake worker.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use blurrpc::CALLBACK_PLACEHOLDER;
use blurrpc::Frame;
use blurrpc::Message;
use blurrpc::MessageKind;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::mock_transport::ChannelTransport;
use crate::peer::Error;
use crate::peer::Peer;
use crate::peer::Request;
use crate::peer::Timeouts;
use crate::transport::Transport;
use crate::value::Callback;
use crate::value::Value;

fn connect() -> (Peer, ChannelTransport) {
    connect_with(Timeouts::default())
}

fn connect_with(timeouts: Timeouts) -> (Peer, ChannelTransport) {
    let (client, worker) = ChannelTransport::pair();
    (Peer::with_timeouts("worker", Box::new(client), timeouts), worker)
}

async fn next_request(worker: &ChannelTransport) -> Message {
    let frame = worker.recv().await.unwrap().expect("peer closed the channel");
    frame.decode().unwrap()
}

async fn reply(worker: &ChannelTransport, message: Message) {
    worker.send(Frame::encode(&message, Vec::new()).unwrap()).await.unwrap();
}

fn collector() -> (Callback, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (Callback::new(move |v| sink.lock().unwrap().push(v)), seen)
}

#[tokio::test]
async fn test_reply_resolves_matching_request() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("1 + 1").into()).await.unwrap();
    let request = next_request(&worker).await;
    assert_eq!(request.id, Some(1));
    assert_eq!(request.code.as_deref(), Some("1 + 1"));

    reply(&worker, Message::reply(MessageKind::Run, 1, json!(2))).await;
    let result = pending.wait().await.unwrap();

    assert_eq!(result.result, Value::Int(2));
    assert!(!result.partial);
    assert_eq!(peer.in_flight(), 0);
}

#[tokio::test]
async fn test_ids_start_at_one_and_increase() {
    let (peer, worker) = connect();

    let mut ids = Vec::new();
    for i in 0..3 {
        let pending = peer.start(Message::run_code(format!("x{}", i)).into()).await.unwrap();
        ids.push(pending.id());
        let request = next_request(&worker).await;
        assert_eq!(request.id, Some(pending.id()));
        reply(&worker, Message::reply(MessageKind::Run, pending.id(), json!(null))).await;
        pending.wait().await.unwrap();
    }

    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_error_reply_rejects_only_its_request() {
    let (peer, worker) = connect();

    let mut pending = Vec::new();
    for i in 0..7 {
        pending.push(peer.start(Message::run_code(format!("step{}", i)).into()).await.unwrap());
    }
    for _ in 0..7 {
        next_request(&worker).await;
    }

    let seventh = pending.pop().unwrap();
    assert_eq!(seventh.id(), 7);
    reply(&worker, Message::failure(MessageKind::Run, 7, "boom")).await;

    let err = seventh.wait().await.unwrap_err();
    assert_eq!(err, Error::Remote("boom".into()));
    assert_eq!(err.to_string(), "boom");
    assert!(!peer.is_pending(7));
    assert_eq!(peer.in_flight(), 6);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_callers() {
    let (peer, worker) = connect();

    let mut pending = Vec::new();
    for i in 0..32 {
        let code = format!("echo({})", i);
        pending.push((code.clone(), peer.start(Message::run_code(code).into()).await.unwrap()));
    }

    let mut requests = Vec::new();
    for _ in 0..pending.len() {
        requests.push(next_request(&worker).await);
    }
    requests.shuffle(&mut rand::thread_rng());
    for request in requests {
        let id = request.id.unwrap();
        reply(&worker, Message::reply(MessageKind::Run, id, json!(request.code))).await;
    }

    for (code, request) in pending {
        let result = request.wait().await.unwrap();
        assert_eq!(result.result, Value::Str(code));
    }
    assert_eq!(peer.in_flight(), 0);
}

#[tokio::test]
async fn test_callback_results_precede_terminal_reply() {
    let (peer, worker) = connect();
    let (callback, seen) = collector();

    let code = format!("stream({})", CALLBACK_PLACEHOLDER);
    let request = Request::new(Message::run_code(code)).callback(callback);
    let pending = peer.start(request).await.unwrap();

    let sent = next_request(&worker).await;
    let token = format!("{}1_default", CALLBACK_PLACEHOLDER);
    assert_eq!(sent.uses_callback.as_deref(), Some(token.as_str()));
    assert_eq!(sent.code, Some(format!("stream({})", token)));

    reply(&worker, Message::callback(1, json!(1))).await;
    reply(&worker, Message::callback(1, json!(2))).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!("done"))).await;

    let result = pending.wait().await.unwrap();
    assert_eq!(result.result, Value::Str("done".into()));
    assert_eq!(*seen.lock().unwrap(), vec![Value::Int(1), Value::Int(2)]);
}

#[tokio::test]
async fn test_concurrent_callbacks_get_distinct_tokens() {
    let (peer, worker) = connect();
    let (first, first_seen) = collector();
    let (second, second_seen) = collector();

    let code = format!("stream({})", CALLBACK_PLACEHOLDER);
    let a = peer
        .start(Request::new(Message::run_code(code.clone())).callback(first).callback_key("rows"))
        .await
        .unwrap();
    let b = peer
        .start(Request::new(Message::run_code(code)).callback(second.with_key("rows")))
        .await
        .unwrap();

    let sent_a = next_request(&worker).await;
    let sent_b = next_request(&worker).await;
    assert_eq!(sent_a.uses_callback, Some(format!("{}1_rows", CALLBACK_PLACEHOLDER)));
    assert_eq!(sent_b.uses_callback, Some(format!("{}2_rows", CALLBACK_PLACEHOLDER)));

    reply(&worker, Message::callback(2, json!("b"))).await;
    reply(&worker, Message::callback(1, json!("a"))).await;
    reply(&worker, Message::reply(MessageKind::Run, 2, json!(null))).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!(null))).await;

    a.wait().await.unwrap();
    b.wait().await.unwrap();
    assert_eq!(*first_seen.lock().unwrap(), vec![Value::Str("a".into())]);
    assert_eq!(*second_seen.lock().unwrap(), vec![Value::Str("b".into())]);
}

#[tokio::test]
async fn test_callback_on_non_run_request_is_dropped() {
    let (peer, worker) = connect();
    let (callback, _) = collector();

    let request = Request::new(Message::load(vec!["numpy".into()])).callback(callback);
    let pending = peer.start(request).await.unwrap();

    let sent = next_request(&worker).await;
    assert_eq!(sent.kind, MessageKind::Load);
    assert_eq!(sent.uses_callback, None);

    reply(&worker, Message::reply(MessageKind::Load, 1, json!(null))).await;
    pending.wait().await.unwrap();
}

#[tokio::test]
async fn test_partial_reply_is_flagged() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("df()").into()).await.unwrap();
    next_request(&worker).await;
    let stub = blurrpc::name_ref("df_1");
    reply(&worker, Message::reply(MessageKind::Run, 1, stub).with_partial()).await;

    let result = pending.wait().await.unwrap();
    assert!(result.partial);
    assert_eq!(result.result, Value::Name(crate::value::Name::new("df_1")));
}

#[tokio::test]
async fn test_timeout_rejects_and_late_reply_is_ignored() {
    let (peer, worker) = connect_with(Timeouts {
        request: Duration::from_millis(50),
        sweep: Duration::from_millis(10),
    });

    let err = peer.request(Message::run_code("sleep()")).await.unwrap_err();
    assert_eq!(err, Error::Timeout);
    assert!(!peer.is_pending(1));

    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!("late"))).await;

    let pending = peer.start(Message::run_code("ok()").into()).await.unwrap();
    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 2, json!(true))).await;
    assert_eq!(pending.wait().await.unwrap().result, Value::Bool(true));
}

#[tokio::test]
async fn test_retired_ids_are_forgotten_after_one_timeout() {
    let (peer, _worker) = connect_with(Timeouts {
        request: Duration::from_millis(50),
        sweep: Duration::from_millis(10),
    });

    for _ in 0..100 {
        drop(peer.start(Message::run_code("abandoned()").into()).await.unwrap());
    }
    assert_eq!(peer.in_flight(), 0);
    assert_eq!(peer.retired(), 100);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(peer.retired(), 0);
}

#[tokio::test]
async fn test_cancel_rejects_with_cancelled() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("slow()").into()).await.unwrap();
    let handle = pending.cancel_handle();
    handle.cancel();

    assert_eq!(pending.wait().await.unwrap_err(), Error::Cancelled);
    assert_eq!(peer.in_flight(), 0);

    next_request(&worker).await;
    reply(&worker, Message::callback(1, json!("late"))).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!("late"))).await;

    let pending = peer.start(Message::run_code("next()").into()).await.unwrap();
    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 2, json!(1))).await;
    assert_eq!(pending.wait().await.unwrap().result, Value::Int(1));
}

#[tokio::test]
async fn test_dropping_pending_request_retires_it() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("abandoned()").into()).await.unwrap();
    drop(pending);
    assert_eq!(peer.in_flight(), 0);

    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!(null))).await;

    let result = peer.start(Message::run_code("after()").into()).await.unwrap();
    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 2, json!(null))).await;
    result.wait().await.unwrap();
}

#[tokio::test]
async fn test_reply_for_unknown_id_fails_the_channel() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("x").into()).await.unwrap();
    next_request(&worker).await;
    reply(&worker, Message::reply(MessageKind::Run, 99, json!(null))).await;

    assert_eq!(pending.wait().await.unwrap_err(), Error::UnknownId(99));
    let err = peer.start(Message::run_code("y").into()).await.err();
    assert_eq!(err, Some(Error::UnknownId(99)));
}

#[tokio::test]
async fn test_second_terminal_reply_is_fatal() {
    let (peer, worker) = connect();

    let first = peer.start(Message::run_code("a").into()).await.unwrap();
    let second = peer.start(Message::run_code("b").into()).await.unwrap();
    next_request(&worker).await;
    next_request(&worker).await;

    reply(&worker, Message::reply(MessageKind::Run, 1, json!(1))).await;
    reply(&worker, Message::reply(MessageKind::Run, 1, json!(1))).await;

    assert_eq!(first.wait().await.unwrap().result, Value::Int(1));
    assert_eq!(second.wait().await.unwrap_err(), Error::UnknownId(1));
}

#[tokio::test]
async fn test_idless_fault_rejects_everything() {
    let (peer, worker) = connect();

    let a = peer.start(Message::run_code("a").into()).await.unwrap();
    let b = peer.start(Message::run_code("b").into()).await.unwrap();
    reply(&worker, Message::fault(MessageKind::Run, "worker crashed")).await;

    assert_eq!(a.wait().await.unwrap_err(), Error::Fault("worker crashed".into()));
    assert_eq!(b.wait().await.unwrap_err(), Error::Fault("worker crashed".into()));
}

#[tokio::test]
async fn test_undecodable_reply_rejects_only_its_request() {
    let (peer, worker) = connect();

    let a = peer.start(Message::run_code("a").into()).await.unwrap();
    let b = peer.start(Message::run_code("b").into()).await.unwrap();
    next_request(&worker).await;
    next_request(&worker).await;

    let garbled = Frame {
        body: br#"{"id": 1, "type": "explode"}"#.to_vec(),
        transfer: vec![],
    };
    worker.send(garbled).await.unwrap();

    assert!(matches!(a.wait().await, Err(Error::Protocol(_))));
    assert!(peer.is_pending(2));

    reply(&worker, Message::reply(MessageKind::Run, 2, json!("fine"))).await;
    assert_eq!(b.wait().await.unwrap().result, Value::Str("fine".into()));
}

#[tokio::test]
async fn test_closed_channel_rejects_pending() {
    let (peer, worker) = connect();

    let pending = peer.start(Message::run_code("x").into()).await.unwrap();
    worker.close();

    assert!(matches!(pending.wait().await, Err(Error::Transport(_))));
    assert!(worker.is_closed());
    let refused = worker.send(Frame::encode(&Message::run_code("y"), Vec::new()).unwrap()).await;
    assert!(matches!(refused, Err(crate::transport::Error::ConnectionLost(_))));
    assert_eq!(worker.sent(), 0);
}

#[tokio::test]
async fn test_buffers_travel_in_the_transfer_list() {
    let (peer, worker) = connect();

    let request = Request::new(Message::set_global("file_1", blurrpc::buffer_ref(0))).transfer(vec![vec![7, 8, 9]]);
    let pending = peer.start(request).await.unwrap();

    let frame = worker.recv().await.unwrap().unwrap();
    let sent = frame.decode().unwrap();
    assert_eq!(sent.kind, MessageKind::SetGlobal);
    assert_eq!(frame.transfer, vec![vec![7, 8, 9]]);

    let mut out = Vec::new();
    let echoed = crate::codec::encode(&Value::Buffer(vec![1, 2]), &mut out).unwrap();
    worker
        .send(Frame::encode(&Message::reply(MessageKind::SetGlobal, 1, echoed), out).unwrap())
        .await
        .unwrap();
    assert_eq!(pending.wait().await.unwrap().result, Value::Buffer(vec![1, 2]));
    assert_eq!(worker.sent(), 1);
}
