//! Type-erased registry mapping an activity type name to a boxed
//! [`Activity`] implementation, mirroring [`super::registry::WorkflowRegistry`]
//! but for the side-effecting steps a workflow schedules.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::activity::{Activity, ActivityContext, ActivityError};

#[derive(Debug, Error)]
pub enum ActivityRegistryError {
    #[error("activity type already registered: {0}")]
    AlreadyRegistered(String),
    #[error("unknown activity type: {0}")]
    Unknown(String),
}

#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, activity_type: &str, activity: impl Activity + 'static) -> Result<(), ActivityRegistryError> {
        if self.activities.contains_key(activity_type) {
            return Err(ActivityRegistryError::AlreadyRegistered(activity_type.to_string()));
        }
        self.activities.insert(activity_type.to_string(), Arc::new(activity));
        Ok(())
    }

    pub fn get(&self, activity_type: &str) -> Result<Arc<dyn Activity>, ActivityRegistryError> {
        self.activities
            .get(activity_type)
            .cloned()
            .ok_or_else(|| ActivityRegistryError::Unknown(activity_type.to_string()))
    }

    pub async fn execute(
        &self,
        activity_type: &str,
        ctx: &ActivityContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ActivityError> {
        let activity = self
            .get(activity_type)
            .map_err(|e| ActivityError::internal(e.to_string()))?;
        activity.execute(ctx, input).await
    }
}
