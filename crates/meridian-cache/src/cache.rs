//! Hot cache for workflow reads: a short-TTL in-memory copy of the durable
//! row, so `GetWorkflow` under steady polling doesn't hit the store on
//! every call.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::Workflow;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
struct Entry {
    workflow: Workflow,
    expires_at: DateTime<Utc>,
}

pub struct WorkflowCache {
    ttl: Duration,
    entries: DashMap<Uuid, Entry>,
}

impl WorkflowCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Specification default: five minutes.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    pub fn put(&self, workflow: Workflow) {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_default();
        self.entries.insert(workflow.id, Entry { workflow, expires_at });
    }

    /// Returns `None` on miss or expiry; an expired entry is evicted as a
    /// side effect of the lookup.
    pub fn get(&self, id: Uuid) -> Option<Workflow> {
        let now = Utc::now();
        if let Some(entry) = self.entries.get(&id) {
            if entry.expires_at > now {
                return Some(entry.workflow.clone());
            }
        } else {
            return None;
        }
        self.entries.remove(&id);
        None
    }

    pub fn invalidate(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::WorkflowType;

    fn workflow() -> Workflow {
        Workflow::new("t", WorkflowType::Custom, serde_json::json!({}), serde_json::json!({}))
    }

    #[test]
    fn put_then_get_hits_before_ttl() {
        let cache = WorkflowCache::new(Duration::from_secs(60));
        let wf = workflow();
        let id = wf.id;
        cache.put(wf);
        assert!(cache.get(id).is_some());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = WorkflowCache::new(Duration::from_millis(0));
        let wf = workflow();
        let id = wf.id;
        cache.put(wf);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(id).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = WorkflowCache::new(Duration::from_secs(60));
        let wf = workflow();
        let id = wf.id;
        cache.put(wf);
        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }
}
