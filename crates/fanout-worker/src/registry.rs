use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fanout_core::{DEFAULT_CAPABILITY, InvalidBatch, TaskSpec};

use crate::Executor;

/// Maps capability names to the executors that provide them.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.executors.keys().collect();
        names.sort();
        f.debug_struct("ExecutorRegistry")
            .field("capabilities", &names)
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose only entry is the default capability.
    pub fn single(executor: impl Executor) -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_CAPABILITY, executor);
        registry
    }

    /// Registers `executor` under `capability`, replacing any previous entry.
    pub fn register(&mut self, capability: impl Into<String>, executor: impl Executor) -> &mut Self {
        self.executors.insert(capability.into(), Arc::new(executor));
        self
    }

    pub fn get(&self, capability: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(capability).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Looks up the executor for `spec`, failing the whole batch if it is missing.
    pub fn resolve(&self, spec: &TaskSpec) -> Result<Arc<dyn Executor>, InvalidBatch> {
        self.get(&spec.capability)
            .ok_or_else(|| InvalidBatch::UnknownCapability {
                task_id: spec.id.clone(),
                capability: spec.capability.clone(),
            })
    }
}
