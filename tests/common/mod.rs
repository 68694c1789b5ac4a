//! Shared fixtures: capability doubles and registry helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use podweave::registry::{Capability, CapabilityError, CapabilityRegistry, NamedInputs};

/// Returns a fixed value and counts invocations.
pub struct StaticJson {
    value: Value,
    calls: Arc<AtomicUsize>,
}

impl StaticJson {
    pub fn new(value: Value) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                value,
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl Capability for StaticJson {
    async fn invoke(&self, _inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// Records every invocation's inputs (as an object) and returns a fixed
/// value.
pub struct RecordingJson {
    value: Value,
    pub calls: Arc<std::sync::Mutex<Vec<Value>>>,
}

impl RecordingJson {
    pub fn new(value: Value) -> (Arc<Self>, Arc<std::sync::Mutex<Vec<Value>>>) {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                value,
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl Capability for RecordingJson {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let object: Map<String, Value> = inputs.into_inner().into_iter().collect();
        self.calls.lock().unwrap().push(Value::Object(object));
        Ok(self.value.clone())
    }
}

/// Always fails with a TTS-flavored error.
pub struct FailingCap {
    pub message: String,
}

impl FailingCap {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl Capability for FailingCap {
    async fn invoke(&self, _inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        Err(CapabilityError::Tts {
            message: self.message.clone(),
        })
    }
}

/// Sleeps, then returns its `value` input (or a fixed value), to exercise
/// completion-order independence.
pub struct DelayedEcho {
    pub delay_ms: u64,
}

#[async_trait]
impl Capability for DelayedEcho {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(inputs.get("value").cloned().unwrap_or(Value::Null))
    }
}

/// Echoes the `value` input after a per-call delay taken from the row
/// itself (`{"value": .., "delay_ms": ..}`), tracking the maximum number
/// of concurrent invocations.
pub struct RowDelayedEcho {
    in_flight: AtomicUsize,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl RowDelayedEcho {
    pub fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
        let max = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: max.clone(),
            }),
            max,
        )
    }
}

#[async_trait]
impl Capability for RowDelayedEcho {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let row = inputs.require("row")?;
        let delay = row.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(row.get("value").cloned().unwrap_or(Value::Null))
    }
}

/// Fails for rows whose `value` matches `poison`, echoes otherwise.
pub struct PoisonEcho {
    pub poison: Value,
}

#[async_trait]
impl Capability for PoisonEcho {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let row = inputs.require("row")?;
        let value = row.get("value").cloned().unwrap_or(Value::Null);
        if value == self.poison {
            return Err(CapabilityError::Provider {
                provider: "test",
                message: format!("poisoned element: {value}"),
            });
        }
        Ok(value)
    }
}

/// Build a registry from (name, capability) pairs.
pub fn registry_with(entries: Vec<(&str, Arc<dyn Capability>)>) -> Arc<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    for (name, capability) in entries {
        registry.register(name, capability);
    }
    Arc::new(registry)
}

/// A minimal `{"scripts": [...]}` payload with `n` alternating turns.
pub fn script_json(n: usize) -> String {
    let lines: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "speaker": if i % 2 == 0 { "Host" } else { "Guest" },
                "text": format!("line {i}"),
            })
        })
        .collect();
    json!({"scripts": lines}).to_string()
}
