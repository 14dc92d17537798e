//! Task entity: the unit of work a Meta-Agent Loop dispatches to an agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::workflow::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub technical_requirements: HashMap<String, Value>,
    pub estimated_hours: f64,
    pub complexity: TaskComplexity,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_type: task_type.into(),
            title: title.into(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            technical_requirements: HashMap::new(),
            estimated_hours: 0.1,
            complexity: TaskComplexity::Simple,
            priority: Priority::default(),
            tags: Vec::new(),
        }
    }

    /// Timeout used when dispatching this task to an agent: `estimated_hours * 3600s`.
    pub fn dispatch_timeout_secs(&self) -> u64 {
        (self.estimated_hours * 3600.0).max(1.0) as u64
    }
}
