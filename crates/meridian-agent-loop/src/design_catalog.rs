//! Fallback `AgentDesign` templates, one per known task type, used by
//! `find_or_create` when no existing agent satisfies a task and a new one
//! must be spawned. Keeping this as a plain table (rather than generating
//! prompts on the fly) makes spawned agents reproducible across runs.

use crate::capability::required_capabilities;
use meridian_core::{AgentDesign, Task};

struct Template {
    task_type: &'static str,
    agent_type: &'static str,
    system_prompt: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        task_type: "backend",
        agent_type: "backend",
        system_prompt: "You are a backend engineering agent. Implement server-side changes, favor small reviewable diffs, and run the existing test suite before reporting completion.",
    },
    Template {
        task_type: "frontend",
        agent_type: "frontend",
        system_prompt: "You are a frontend engineering agent. Implement UI changes consistent with the existing component patterns and verify them in a browser where possible.",
    },
    Template {
        task_type: "database",
        agent_type: "database",
        system_prompt: "You are a database engineering agent. Write reversible migrations and verify them against a disposable copy of the schema before applying.",
    },
    Template {
        task_type: "devops",
        agent_type: "devops",
        system_prompt: "You are a devops agent. Make infrastructure and CI changes incrementally and confirm pipelines remain green.",
    },
    Template {
        task_type: "security",
        agent_type: "security",
        system_prompt: "You are a security review agent. Identify vulnerabilities precisely, citing the exact line and the exploit scenario, and avoid speculative findings.",
    },
    Template {
        task_type: "docs",
        agent_type: "docs",
        system_prompt: "You are a documentation agent. Keep prose accurate to the current code and prefer editing existing docs over duplicating them.",
    },
    Template {
        task_type: "testing",
        agent_type: "testing",
        system_prompt: "You are a test-automation agent. Write tests that would catch the regression described in the task before any fix is applied.",
    },
    Template {
        task_type: "mobile",
        agent_type: "mobile",
        system_prompt: "You are a mobile engineering agent. Implement changes idiomatic to the target platform and verify them on a simulator or device.",
    },
];

const GENERIC_PROMPT: &str = "You are a general-purpose engineering agent. Complete the assigned task directly and report results precisely.";

/// A fresh root design for `task`, seeded with that task's required
/// capabilities. Falls back to a generic template for unrecognized task
/// types rather than failing — the Meta-Agent Loop's dynamic-spawn path has
/// no other recourse once `FindOrCreateAgentForTask` decides to create.
pub fn design_for_task(task: &Task) -> AgentDesign {
    let template = TEMPLATES.iter().find(|t| t.task_type == task.task_type);
    let (agent_type, system_prompt) = match template {
        Some(t) => (t.agent_type, t.system_prompt),
        None => (task.task_type.as_str(), GENERIC_PROMPT),
    };

    let mut design = AgentDesign::new_root(format!("{agent_type}-agent"), agent_type, system_prompt);
    design.capabilities = required_capabilities(task).into_iter().collect();
    design
}
