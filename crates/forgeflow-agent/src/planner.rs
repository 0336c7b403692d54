use std::collections::BTreeSet;

use forgeflow_core::{Plan, PlanStep};

/// Parses a markdown checklist (`- [ ] …` / `- [x] …`) into an ordered
/// [`Plan`], assigning ids `step-0`, `step-1`, … in order of appearance. A
/// trailing `[depends: step-N, step-M]` hint on a line populates
/// `dependsOn`. Returns an empty plan if no checklist items are detected.
pub fn parse_plan(text: &str) -> Plan {
    let mut steps = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = strip_checklist_marker(trimmed) else {
            continue;
        };

        let (description, depends_on) = extract_depends_hint(rest);
        let id = format!("step-{}", steps.len());
        let mut step = PlanStep::new(id, description);
        if let Some(deps) = depends_on {
            step = step.with_depends_on(deps);
        }
        steps.push(step);
    }

    Plan::from_steps(steps).unwrap_or_default()
}

fn strip_checklist_marker(line: &str) -> Option<&str> {
    for marker in ["- [ ] ", "- [x] ", "- [X] "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest);
        }
    }
    None
}

fn extract_depends_hint(text: &str) -> (String, Option<BTreeSet<String>>) {
    let trimmed = text.trim_end();
    let Some(open) = trimmed.rfind("[depends:") else {
        return (trimmed.to_string(), None);
    };
    if !trimmed.ends_with(']') {
        return (trimmed.to_string(), None);
    }

    let description = trimmed[..open].trim_end().to_string();
    let inner = &trimmed[open + "[depends:".len()..trimmed.len() - 1];
    let deps: BTreeSet<String> = inner
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (description, Some(deps))
}
