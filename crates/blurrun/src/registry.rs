//! # Registries
//!
//! `OperationRegistry` maps operation names to their descriptors.
//! `InitRegistry` tracks which operations have had their initializer run.
//!
//! ## Invariants
//! - An initializer runs at most once per name for the life of the
//!   `InitRegistry`, no matter how many clients share it.
//! - Concurrent first calls wait for the one running initializer.
//! - A failed initializer fails only the call that ran it; the name stays
//!   marked, and later calls proceed without retrying until `forget` or
//!   `reset` is called.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;
use tracing::warn;

use crate::backend::SharedBackend;
use crate::error::Error;
use crate::error::Result;
use crate::operation::Operation;

#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: DashMap<String, Arc<Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor, returning the one it replaced.
    pub fn register(&self, operation: Operation) -> Option<Arc<Operation>> {
        let name = operation.name().to_string();
        self.operations.insert(name, Arc::new(operation))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Operation>> {
        self.operations.get(name).map(|entry| entry.value().clone())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Operation>> {
        self.get(name).ok_or_else(|| Error::OperationNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl FromIterator<Operation> for OperationRegistry {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        let registry = Self::new();
        for operation in iter {
            registry.register(operation);
        }
        registry
    }
}

type InitCell = Arc<OnceCell<Result<()>>>;

#[derive(Debug, Default)]
pub struct InitRegistry {
    cells: DashMap<String, InitCell>,
}

impl InitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every client in the process that was not given
    /// its own.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<InitRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Runs the operation's initializer if no call has attempted it yet.
    pub async fn ensure(&self, operation: &Operation, backend: &SharedBackend) -> Result<()> {
        let Some(initializer) = operation.initializer() else {
            return Ok(());
        };

        let cell = self
            .cells
            .entry(operation.name().to_string())
            .or_default()
            .clone();

        let ran = AtomicBool::new(false);
        let ran_flag = &ran;
        let initializer = initializer.clone();
        let backend = backend.clone();
        let name = operation.name();
        let outcome = cell
            .get_or_init(move || async move {
                ran_flag.store(true, Ordering::Relaxed);
                debug!(operation = name, "running initializer");
                initializer.run(backend).await
            })
            .await;

        match outcome {
            Err(e) if ran.load(Ordering::Relaxed) => Err(e.clone()),
            Err(e) => {
                warn!(operation = name, error = %e, "initializer failed earlier, not retrying");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Whether an initializer for `name` has been attempted.
    pub fn is_initialized(&self, name: &str) -> bool {
        self.cells
            .get(name)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Allows the initializer for `name` to run again.
    pub fn forget(&self, name: &str) {
        self.cells.remove(name);
    }

    pub fn reset(&self) {
        self.cells.clear();
    }
}
