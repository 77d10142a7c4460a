use std::collections::BTreeSet;

use crate::error::MigrationError;
use crate::scripts::{MigrationScript, ScriptVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan<'a> {
    /// Scripts to execute, ascending by version.
    pub pending: Vec<&'a MigrationScript>,
    /// Scripts below the latest applied version, left out because
    /// out-of-order execution is disabled.
    pub skipped: Vec<&'a MigrationScript>,
    pub already_applied: usize,
}

/// Decide which of `scripts` (ascending) still need to run given the applied
/// history.
pub fn plan_migration<'a>(
    scripts: &'a [MigrationScript],
    applied: &[ScriptVersion],
    out_of_order: bool,
    validate_on_migrate: bool,
) -> Result<MigrationPlan<'a>, MigrationError> {
    let applied_set: BTreeSet<&ScriptVersion> = applied.iter().collect();

    if validate_on_migrate {
        let local: BTreeSet<&ScriptVersion> = scripts.iter().map(|script| &script.version).collect();
        let missing: Vec<String> = applied_set
            .iter()
            .filter(|version| !local.contains(*version))
            .map(|version| version.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MigrationError::Validation(format!(
                "applied versions without a local script: {}",
                missing.join(", ")
            )));
        }
    }

    let latest_applied = applied_set.iter().next_back().copied();

    let mut plan = MigrationPlan {
        pending: Vec::new(),
        skipped: Vec::new(),
        already_applied: 0,
    };

    for script in scripts {
        if applied_set.contains(&script.version) {
            plan.already_applied += 1;
            continue;
        }
        let is_behind = latest_applied.is_some_and(|latest| script.version < *latest);
        if is_behind && !out_of_order {
            plan.skipped.push(script);
        } else {
            plan.pending.push(script);
        }
    }

    Ok(plan)
}
