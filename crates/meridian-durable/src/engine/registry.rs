//! Type-erased registry mapping a workflow type name to a factory producing
//! a boxed [`Workflow`] implementation, so the executor can dispatch on the
//! `workflow_type` string carried in persisted state without the caller
//! needing generics at the dispatch site.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::workflow::{Workflow, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowSignal};

/// Object-safe facade over `Workflow` so heterogeneous workflow types can
/// live behind one trait object.
pub trait AnyWorkflow: Send + Sync {
    fn workflow_type(&self) -> &'static str;
    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError>;
    fn on_signal(&self, signal: &WorkflowSignal, history: &[WorkflowEvent]) -> Vec<WorkflowAction>;
}

pub struct WorkflowWrapper<W: Workflow>(pub W);

impl<W: Workflow> AnyWorkflow for WorkflowWrapper<W> {
    fn workflow_type(&self) -> &'static str {
        self.0.workflow_type()
    }

    fn decide(&self, input: &Value, history: &[WorkflowEvent]) -> Result<Vec<WorkflowAction>, WorkflowError> {
        self.0.decide(input, history)
    }

    fn on_signal(&self, signal: &WorkflowSignal, history: &[WorkflowEvent]) -> Vec<WorkflowAction> {
        self.0.on_signal(signal, history)
    }
}

pub type WorkflowFactory = Arc<dyn Fn() -> Box<dyn AnyWorkflow> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("workflow type already registered: {0}")]
    AlreadyRegistered(String),
    #[error("unknown workflow type: {0}")]
    Unknown(String),
}

/// Registry of workflow-type-name -> factory. One instance lives in the
/// executor; registration happens once at startup before any workflow runs.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W, F>(&mut self, workflow_type: &str, factory: F) -> Result<(), RegistryError>
    where
        W: Workflow,
        F: Fn() -> W + Send + Sync + 'static,
    {
        if self.factories.contains_key(workflow_type) {
            return Err(RegistryError::AlreadyRegistered(workflow_type.to_string()));
        }
        let factory: WorkflowFactory = Arc::new(move || Box::new(WorkflowWrapper(factory())));
        self.factories.insert(workflow_type.to_string(), factory);
        Ok(())
    }

    pub fn create(&self, workflow_type: &str) -> Result<Box<dyn AnyWorkflow>, RegistryError> {
        let factory = self
            .factories
            .get(workflow_type)
            .ok_or_else(|| RegistryError::Unknown(workflow_type.to_string()))?;
        Ok(factory())
    }

    pub fn is_registered(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}
