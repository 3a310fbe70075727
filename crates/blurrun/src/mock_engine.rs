//! Scripted in-memory engine.
//!
//! Records every call it receives and answers from a small script keyed by
//! substrings of the code (or method path). Used by the test suite and handy
//! for wiring a client end to end without a real runtime.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::engine;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::value::Callback;
use crate::value::Kwargs;
use crate::value::Proxy;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Initialize(JsonValue),
    Load(Vec<String>),
    RunCode(String),
    RunMethod {
        source: Option<Value>,
        path: String,
        kwargs: Kwargs,
    },
    SetGlobal(String, Value),
    GetGlobal(String),
    DeleteGlobal(String),
}

#[derive(Debug, Clone, Default)]
struct Script {
    needle: String,
    outcome: Option<Result<Value, String>>,
    delay: Option<Duration>,
    emit: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct RecordingEngine {
    scripts: Vec<Script>,
    proxies: bool,
    init_error: Option<String>,
    calls: Mutex<Vec<EngineCall>>,
    globals: DashMap<String, Value>,
    next_proxy: AtomicU64,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(mut self, needle: &str, f: impl FnOnce(&mut Script)) -> Self {
        match self.scripts.iter_mut().find(|s| s.needle == needle) {
            Some(script) => f(script),
            None => {
                let mut script = Script {
                    needle: needle.to_string(),
                    ..Script::default()
                };
                f(&mut script);
                self.scripts.push(script);
            }
        }
        self
    }

    /// Code (or a method path) containing `needle` returns `value`.
    pub fn respond(self, needle: &str, value: Value) -> Self {
        self.script(needle, |s| s.outcome = Some(Ok(value)))
    }

    /// Code containing `needle` raises `message`.
    pub fn fail(self, needle: &str, message: &str) -> Self {
        let message = message.to_string();
        self.script(needle, |s| s.outcome = Some(Err(message)))
    }

    /// Code containing `needle` takes `delay` to complete.
    pub fn delay(self, needle: &str, delay: Duration) -> Self {
        self.script(needle, |s| s.delay = Some(delay))
    }

    /// Code containing `needle` feeds `values` to every bound callback it
    /// mentions, before returning.
    pub fn emit(self, needle: &str, values: Vec<Value>) -> Self {
        self.script(needle, |s| s.emit = values)
    }

    /// Unscripted method calls return a fresh proxy.
    pub fn proxy_results(mut self) -> Self {
        self.proxies = true;
        self
    }

    pub fn fail_initialize(mut self, message: &str) -> Self {
        self.init_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().clone()
    }

    /// The code of every `run_code` call, in order.
    pub fn codes(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::RunCode(code) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|entry| entry.value().clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EngineCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: EngineCall) {
        self.lock().push(call);
    }

    fn find(&self, text: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| text.contains(&s.needle))
    }

    /// Bound callbacks whose global name satisfies `mentioned`.
    fn callbacks(&self, mentioned: impl Fn(&str) -> bool) -> Vec<Callback> {
        self.globals
            .iter()
            .filter_map(|entry| match entry.value() {
                Value::Callback(callback) if mentioned(entry.key()) => Some(callback.clone()),
                _ => None,
            })
            .collect()
    }

    async fn play(&self, script: Option<&Script>, callbacks: Vec<Callback>) -> Option<engine::Result<Value>> {
        let script = script?;
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        for value in &script.emit {
            for callback in &callbacks {
                callback.call(value.clone());
            }
        }
        script
            .outcome
            .clone()
            .map(|outcome| outcome.map_err(EngineError))
    }
}

fn mentions(value: &Value, name: &str) -> bool {
    match value {
        Value::Name(n) => n.as_str() == name,
        Value::List(items) => items.iter().any(|v| mentions(v, name)),
        Value::Record(record) => record.values().any(|v| mentions(v, name)),
        _ => false,
    }
}

fn direct_callbacks(kwargs: &Kwargs) -> Vec<Callback> {
    kwargs
        .values()
        .filter_map(|value| match value {
            Value::Callback(callback) => Some(callback.clone()),
            _ => None,
        })
        .collect()
}

#[async_trait::async_trait]
impl Engine for RecordingEngine {
    async fn initialize(&self, options: &JsonValue) -> engine::Result<()> {
        self.record(EngineCall::Initialize(options.clone()));
        match &self.init_error {
            Some(message) => Err(EngineError(message.clone())),
            None => Ok(()),
        }
    }

    async fn load(&self, packages: &[String]) -> engine::Result<()> {
        self.record(EngineCall::Load(packages.to_vec()));
        Ok(())
    }

    async fn run_code(&self, code: &str) -> engine::Result<Value> {
        self.record(EngineCall::RunCode(code.to_string()));
        let callbacks = self.callbacks(|name| code.contains(name));
        if let Some(outcome) = self.play(self.find(code), callbacks).await {
            return outcome;
        }
        Ok(self.global(code.trim()).unwrap_or(Value::Null))
    }

    async fn run_method(&self, source: Option<Value>, path: &str, kwargs: Kwargs) -> engine::Result<Value> {
        let mut callbacks = self.callbacks(|name| kwargs.values().any(|v| mentions(v, name)));
        callbacks.extend(direct_callbacks(&kwargs));
        self.record(EngineCall::RunMethod {
            source,
            path: path.to_string(),
            kwargs,
        });
        if let Some(outcome) = self.play(self.find(path), callbacks).await {
            return outcome;
        }
        if self.proxies {
            let id = self.next_proxy.fetch_add(1, Ordering::Relaxed);
            return Ok(Value::Proxy(Proxy::new(id, "DataFrame")));
        }
        Ok(Value::Null)
    }

    async fn set_global(&self, name: &str, value: Value) -> engine::Result<()> {
        self.record(EngineCall::SetGlobal(name.to_string(), value.clone()));
        self.globals.insert(name.to_string(), value);
        Ok(())
    }

    async fn get_global(&self, name: &str) -> engine::Result<Value> {
        self.record(EngineCall::GetGlobal(name.to_string()));
        self.global(name)
            .ok_or_else(|| EngineError(format!("name '{}' is not defined", name)))
    }

    async fn delete_global(&self, name: &str) -> engine::Result<()> {
        self.record(EngineCall::DeleteGlobal(name.to_string()));
        self.globals.remove(name);
        Ok(())
    }
}
