//! Deterministic mapping from a [`Task`] to the capability set an executing
//! agent must advertise. Per the design notes, capability matching is
//! intentionally a simple, auditable heuristic rather than a scoring model.

use meridian_core::Task;
use std::collections::BTreeSet;

const TASK_TYPE_CAPABILITIES: &[(&str, &[&str])] = &[
    ("backend", &["api", "database", "server"]),
    ("frontend", &["ui", "browser"]),
    ("database", &["database", "migrations"]),
    ("devops", &["infrastructure", "ci"]),
    ("security", &["security-review"]),
    ("docs", &["documentation"]),
    ("testing", &["test-automation"]),
    ("mobile", &["mobile", "ui"]),
];

/// `required_capabilities` from task type, tags, and `technical_requirements`
/// (spec §4.5(a)): the task-type table contributes a base set, tags are
/// required verbatim (they are already capability-shaped, e.g. `svelte`),
/// and any `technical_requirements` entry whose value is a plain string
/// contributes that string as a capability tag (e.g. `{"language": "rust"}`
/// requires capability `rust`).
pub fn required_capabilities(task: &Task) -> Vec<String> {
    let mut caps: BTreeSet<String> = BTreeSet::new();

    if let Some((_, base)) = TASK_TYPE_CAPABILITIES.iter().find(|(t, _)| *t == task.task_type) {
        caps.extend(base.iter().map(|s| s.to_string()));
    }
    caps.extend(task.tags.iter().cloned());
    for value in task.technical_requirements.values() {
        if let Some(s) = value.as_str() {
            caps.insert(s.to_string());
        }
    }

    caps.into_iter().collect()
}

/// ⌈|required|/2⌉, per the spec's score-floor rule. A task with zero
/// required capabilities is satisfied by any available agent (floor 0).
pub fn score_floor(required_len: usize) -> usize {
    required_len.div_ceil(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::Task;

    #[test]
    fn backend_task_maps_to_base_triad() {
        let task = Task::new("backend", "wire up endpoint");
        let caps = required_capabilities(&task);
        assert!(caps.contains(&"api".to_string()));
        assert!(caps.contains(&"database".to_string()));
        assert!(caps.contains(&"server".to_string()));
    }

    #[test]
    fn tags_are_added_verbatim() {
        let mut task = Task::new("frontend", "build widget");
        task.tags = vec!["svelte".to_string()];
        let caps = required_capabilities(&task);
        assert!(caps.contains(&"svelte".to_string()));
    }

    #[test]
    fn score_floor_rounds_up() {
        assert_eq!(score_floor(3), 2);
        assert_eq!(score_floor(4), 2);
        assert_eq!(score_floor(0), 0);
    }
}
