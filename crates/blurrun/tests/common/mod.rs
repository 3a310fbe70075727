//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use blurrun::ArgSpec;
use blurrun::Callback;
use blurrun::Client;
use blurrun::Config;
use blurrun::InitRegistry;
use blurrun::Kind;
use blurrun::Operation;
use blurrun::OperationRegistry;
use blurrun::Source;
use blurrun::Value;
use blurrun::WorkerHost;
use blurrun::mock_engine::RecordingEngine;
use blurrun::mock_transport::ChannelTransport;
use blurrun::python;
use blurrun::value::TARGET;

/// A small catalogue covering every strategy and flag.
pub fn operations() -> Arc<OperationRegistry> {
    let registry: OperationRegistry = [
        Operation::builder("cols.upper")
            .source(Kind::Dataframe)
            .target(Kind::Dataframe)
            .arg(ArgSpec::new("cols").default("*"))
            .build(),
        Operation::builder("copy")
            .source(Kind::Dataframe)
            .target(Kind::Dataframe)
            .creates_new()
            .build(),
        Operation::builder("rows.count")
            .source(Kind::Dataframe)
            .target(Kind::Value)
            .build(),
        Operation::builder("readCsv")
            .target(Kind::Dataframe)
            .arg(ArgSpec::new("buffer").required())
            .code(|kwargs| {
                let buffer = kwargs.get("buffer").map(python::literal).unwrap_or_default();
                match kwargs.get(TARGET).and_then(Value::as_reference) {
                    Some(target) => format!("{} = pd.read_csv({})", target, buffer),
                    None => format!("pd.read_csv({})", buffer),
                }
            })
            .build(),
        Operation::builder("fromBytes")
            .target(Kind::Dataframe)
            .arg(ArgSpec::new("data").required())
            .build(),
        Operation::builder("profile")
            .source(Kind::Dataframe)
            .target(Kind::Value)
            .init_code("import blurr_profile")
            .build(),
        Operation::builder("stream")
            .target(Kind::Value)
            .code(|_| format!("stream({})", blurrpc::CALLBACK_PLACEHOLDER))
            .build(),
    ]
    .into_iter()
    .collect();
    Arc::new(registry)
}

pub fn config() -> Config {
    Config {
        name_tag: Some("t".into()),
        ..Config::default()
    }
}

/// A client connected to a worker host driving `engine`.
pub async fn remote(engine: Arc<RecordingEngine>, config: Config) -> Client {
    blurrun::logging::init();
    let (client_end, worker_end) = ChannelTransport::pair();
    WorkerHost::new(engine, Box::new(worker_end)).spawn();
    Client::builder()
        .config(config)
        .operations(operations())
        .inits(Arc::new(InitRegistry::new()))
        .connect(Box::new(client_end))
        .await
        .expect("worker handshake failed")
}

/// A client over `engine` in this process.
pub fn in_process(engine: Arc<RecordingEngine>) -> Client {
    blurrun::logging::init();
    Client::builder()
        .config(config())
        .operations(operations())
        .inits(Arc::new(InitRegistry::new()))
        .in_process(engine)
}

pub fn handle(value: Value) -> Source {
    match value {
        Value::Handle(source) => source,
        other => panic!("expected a handle, got {:?}", other),
    }
}

pub fn collector() -> (Callback, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (Callback::new(move |v| sink.lock().unwrap().push(v)), seen)
}
