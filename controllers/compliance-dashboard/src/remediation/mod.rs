//! Remediation engine.
//!
//! A remediation record embeds the object that fixes a failed check. The
//! engine resolves where that object lives, creates or updates it, removes it
//! again on request, and drives severity batches with a pause after each node
//! configuration change so the machine config pools can roll out one change
//! at a time.

mod addressing;
mod engine;

pub use engine::RemediationEngine;

use cluster_client::Document;
use serde_json::Value;

/// Node role label carried by machine configs and their remediations
pub const ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";

/// Kind whose rollout reboots the nodes of a pool
pub const MACHINE_CONFIG_KIND: &str = "MachineConfig";

/// Path of the embedded target object inside a remediation record
pub(crate) const TARGET_PATH: [&str; 3] = ["spec", "current", "object"];

const DEFAULT_ROLE: &str = "worker";

/// Reads `spec.apply`, accepting a boolean or the string `"true"`
#[must_use]
pub fn apply_flag(remediation: &Document) -> bool {
    match remediation.nested(&["spec", "apply"]) {
        Some(Value::Bool(applied)) => *applied,
        Some(Value::String(applied)) => applied == "true",
        _ => false,
    }
}

/// Node role a remediation targets.
///
/// Precedence: the record's role label, then the embedded object's role
/// label, then `master` or `worker` found in the record name (master wins
/// when both appear), then `worker`.
#[must_use]
pub fn detect_role(remediation: &Document) -> String {
    if let Some(role) = remediation.label(ROLE_LABEL) {
        return role.to_string();
    }
    if let Some(role) = remediation
        .nested_document(&TARGET_PATH)
        .and_then(|target| target.label(ROLE_LABEL).map(str::to_string))
    {
        return role;
    }

    let name = remediation.name().to_ascii_lowercase();
    if name.contains("master") {
        "master".to_string()
    } else {
        DEFAULT_ROLE.to_string()
    }
}
