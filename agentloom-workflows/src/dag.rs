//! ABOUTME: Topological layering of workflow steps via Kahn's algorithm
//! ABOUTME: Reports one offending cycle path when progress halts

use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use std::collections::{HashMap, HashSet};

/// Produce ordered layers of step IDs. Every step in a layer has all of its
/// dependencies in earlier layers; steps within a layer may run
/// concurrently.
///
/// Iteration follows declaration order so layering is deterministic.
pub fn build_layers(steps: &[StepRecord]) -> Result<Vec<Vec<String>>> {
    let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    let known: HashSet<&str> = ids.iter().copied().collect();

    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        for dep in &step.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(LoomError::validation(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.id
                )));
            }
            *in_degree.get_mut(step.id.as_str()).expect("known id") += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(step.id.as_str());
        }
    }

    let mut layers: Vec<Vec<String>> = Vec::new();
    let mut placed: HashSet<&str> = HashSet::new();

    while placed.len() < ids.len() {
        let ready: Vec<&str> = ids
            .iter()
            .copied()
            .filter(|id| !placed.contains(id) && in_degree[id] == 0)
            .collect();

        if ready.is_empty() {
            let remaining: Vec<&str> = ids
                .iter()
                .copied()
                .filter(|id| !placed.contains(id))
                .collect();
            return Err(LoomError::Cycle {
                path: find_cycle(steps, &remaining),
            });
        }

        for id in &ready {
            placed.insert(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                *in_degree.get_mut(dependent).expect("known id") -= 1;
            }
        }
        layers.push(ready.into_iter().map(str::to_string).collect());
    }

    Ok(layers)
}

/// Walk dependency edges among the unplaced steps until a node repeats,
/// then slice out the loop for the error message.
fn find_cycle(steps: &[StepRecord], remaining: &[&str]) -> Vec<String> {
    let remaining_set: HashSet<&str> = remaining.iter().copied().collect();
    let deps_of = |id: &str| -> Option<&StepRecord> { steps.iter().find(|s| s.id == id) };

    let start = remaining[0];
    let mut trail: Vec<&str> = vec![start];
    let mut current = start;

    loop {
        let Some(step) = deps_of(current) else { break };
        let Some(next) = step
            .depends_on
            .iter()
            .map(String::as_str)
            .find(|dep| remaining_set.contains(dep))
        else {
            break;
        };
        if let Some(pos) = trail.iter().position(|id| *id == next) {
            let mut cycle: Vec<String> = trail[pos..].iter().map(|s| (*s).to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        trail.push(next);
        current = next;
    }
    // Fallback: report every unplaced step
    remaining.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::types::workflow::ActionKind;

    fn step(id: &str, deps: &[&str]) -> StepRecord {
        let mut record = StepRecord::new(id, ActionKind::Transform);
        record.depends_on = deps.iter().map(|d| (*d).to_string()).collect();
        record
    }

    #[test]
    fn test_single_layer_for_independent_steps() {
        let layers = build_layers(&[step("a", &[]), step("b", &[]), step("c", &[])]).unwrap();
        assert_eq!(layers, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_fan_out_fan_in_layering() {
        let layers = build_layers(&[
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["a"]),
            step("e", &["b", "c", "d"]),
        ])
        .unwrap();
        assert_eq!(
            layers,
            vec![vec!["a"], vec!["b", "c", "d"], vec!["e"]]
        );
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let err = build_layers(&[
            step("a", &["c"]),
            step("b", &["a"]),
            step("c", &["b"]),
        ])
        .unwrap_err();
        match err {
            LoomError::Cycle { path } => {
                assert!(path.len() >= 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected Cycle, got {other}"),
        }
    }

    #[test]
    fn test_self_cycle() {
        let err = build_layers(&[step("a", &["a"])]).unwrap_err();
        assert!(matches!(err, LoomError::Cycle { .. }));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = build_layers(&[step("a", &["ghost"])]).unwrap_err();
        assert!(err.to_string().contains("unknown step 'ghost'"));
    }

    #[test]
    fn test_deterministic_layering() {
        let steps = [
            step("z", &[]),
            step("m", &["z"]),
            step("a", &["z"]),
            step("k", &["m", "a"]),
        ];
        let first = build_layers(&steps).unwrap();
        for _ in 0..5 {
            assert_eq!(build_layers(&steps).unwrap(), first);
        }
        // Declaration order within a layer
        assert_eq!(first[1], vec!["m", "a"]);
    }
}
