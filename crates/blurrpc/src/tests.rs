use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::CALLBACK_PLACEHOLDER;
use crate::Error;
use crate::Frame;
use crate::Message;
use crate::MessageKind;
use crate::as_buffer_ref;
use crate::as_name_ref;
use crate::buffer_ref;
use crate::name_ref;

#[test]
fn test_message_uses_wire_field_names() {
    let mut msg = Message::callback(7, json!(1));
    msg.uses_callback = Some("cb".into());
    let value = serde_json::to_value(&msg).unwrap();

    assert_eq!(value["id"], json!(7));
    assert_eq!(value["type"], json!("run"));
    assert_eq!(value["isCallbackResult"], json!(true));
    assert_eq!(value["usesCallback"], json!("cb"));
    assert!(value.get("error").is_none(), "unset fields are omitted");
}

#[test]
fn test_set_global_kind_is_camel_case() {
    let msg = Message::set_global("x", json!(1)).with_id(3);
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["type"], json!("setGlobal"));
}

#[test]
fn test_frame_carries_transfer_list() {
    let msg = Message::set_global("file_1", buffer_ref(0)).with_id(1);
    let frame = Frame::encode(&msg, vec![vec![1, 2, 3]]).unwrap();

    let decoded = frame.decode().unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(as_buffer_ref(decoded.value.as_ref().unwrap()), Some(0));
    assert_eq!(frame.transfer[0], vec![1, 2, 3]);
}

#[test]
fn test_decode_tolerates_unknown_fields() {
    let frame = Frame {
        body: br#"{"id": 4, "type": "run", "result": 2, "extra": [1]}"#.to_vec(),
        transfer: vec![],
    };
    let msg = frame.decode().unwrap();
    assert_eq!(msg.id, Some(4));
    assert_eq!(msg.kind, MessageKind::Run);
    assert_eq!(msg.result, Some(json!(2)));
}

#[test]
fn test_malformed_frame_keeps_attributable_id() {
    let frame = Frame {
        body: br#"{"id": 9, "type": "explode"}"#.to_vec(),
        transfer: vec![],
    };
    assert!(matches!(frame.decode(), Err(Error::Malformed(_))));
    assert_eq!(frame.peek_id(), Some(9));

    let garbage = Frame { body: vec![0xFF, 0x00], transfer: vec![] };
    assert_eq!(garbage.peek_id(), None);
}

#[test]
fn test_name_reference_markers() {
    let marker = name_ref("df1");
    assert_eq!(as_name_ref(&marker), Some("df1"));
    assert_eq!(as_buffer_ref(&marker), None);
    assert_eq!(as_name_ref(&json!({"name": "df1"})), None);
}

#[test]
fn test_rewrite_callback_in_code() {
    let code = format!("run({p}); other({p})", p = CALLBACK_PLACEHOLDER);
    let mut msg = Message::run_code(code);
    msg.rewrite_callback(CALLBACK_PLACEHOLDER, "__blurr__callback_3_default");
    assert_eq!(
        msg.code.as_deref(),
        Some("run(__blurr__callback_3_default); other(__blurr__callback_3_default)")
    );
}

#[test]
fn test_rewrite_callback_in_nested_kwargs() {
    let mut kwargs = Map::new();
    kwargs.insert("func".into(), name_ref(CALLBACK_PLACEHOLDER));
    kwargs.insert("nested".into(), json!({"inner": [name_ref(CALLBACK_PLACEHOLDER), name_ref("keep")]}));
    let mut msg = Message::run_method(Some("df".into()), "cols.apply", kwargs);

    msg.rewrite_callback(CALLBACK_PLACEHOLDER, "unique");

    let kwargs = msg.kwargs.unwrap();
    assert_eq!(as_name_ref(&kwargs["func"]), Some("unique"));
    let inner = &kwargs["nested"]["inner"];
    assert_eq!(as_name_ref(&inner[0]), Some("unique"));
    assert_eq!(as_name_ref(&inner[1]), Some("keep"));
}

#[test]
fn test_target_accepts_string_or_name() {
    let mut kwargs = Map::new();
    kwargs.insert("target".into(), Value::String("df2".into()));
    let msg = Message::run_method(None, "sample", kwargs);
    assert_eq!(msg.target(), Some("df2"));

    let mut kwargs = Map::new();
    kwargs.insert("target".into(), name_ref("df3"));
    let msg = Message::run_method(None, "sample", kwargs);
    assert_eq!(msg.target(), Some("df3"));

    assert_eq!(Message::run_code("1").target(), None);
}

#[test]
fn test_code_request_carries_target() {
    let msg = Message::run_code("df1 = load()").with_target("df1");
    assert_eq!(msg.target(), Some("df1"));

    let frame = Frame::encode(&msg, vec![]).unwrap();
    let decoded = frame.decode().unwrap();
    assert_eq!(decoded.code.as_deref(), Some("df1 = load()"));
    assert_eq!(decoded.target(), Some("df1"));
}

#[test]
fn test_fault_has_no_id() {
    let msg = Message::fault(MessageKind::Init, "boot failed");
    let frame = Frame::encode(&msg, vec![]).unwrap();
    let decoded = frame.decode().unwrap();
    assert_eq!(decoded.id, None);
    assert_eq!(decoded.error.as_deref(), Some("boot failed"));
}
