//! Scan lifecycle.
//!
//! Scans are requested by binding a profile to scan settings; the operator
//! turns each binding into a suite of scans. Status is read back from the
//! suites and joined with the per-scan records. Periodic scans share one
//! scheduled ScanSetting across two bindings.

use crate::error::DashboardError;
use crate::resources::{self, COMPLIANCE_API_VERSION};
use cluster_client::{ClusterClientTrait, ClusterError, Document, Gvr};
use compliance_types::{
    Condition, PeriodicBinding, PeriodicScan, PeriodicScanOptions, ProfileInfo, RecommendedScans, ScanOptions,
    ScanStatus, SuiteStatus,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scan settings used when a request names none
pub const DEFAULT_SCAN_SETTING: &str = "default";

/// Label the operator puts on every scan of a suite
pub const SUITE_LABEL: &str = "compliance.openshift.io/suite";

/// Annotation that makes the operator rerun a scan
pub const RESCAN_ANNOTATION: &str = "compliance.openshift.io/rescan";

/// Broad coverage without overlap: CIS, NIST 800-53 moderate for platform
/// and nodes, and PCI-DSS. Pairs of (binding name, profile).
pub const RECOMMENDED_PROFILES: [(&str, &str); 4] = [
    ("ocp4-cis-scan", "ocp4-cis"),
    ("ocp4-moderate-scan", "ocp4-moderate"),
    ("ocp4-pci-dss-scan", "ocp4-pci-dss"),
    ("rhcos4-moderate-scan", "rhcos4-moderate"),
];

/// ScanSetting carrying the periodic schedule
pub const PERIODIC_SETTING: &str = "periodic-setting";

/// Binding for Essential Eight profiles
pub const PERIODIC_E8_BINDING: &str = "periodic-e8";

/// Binding for every other periodic profile
pub const PERIODIC_CIS_BINDING: &str = "cis-scan";

/// Creates, reruns, deletes and reports on compliance scans
pub struct ScanService {
    client: Option<Arc<dyn ClusterClientTrait>>,
}

impl ScanService {
    pub fn new(client: Option<Arc<dyn ClusterClientTrait>>) -> Self {
        Self { client }
    }

    fn connected(&self) -> Result<&dyn ClusterClientTrait, DashboardError> {
        self.client.as_deref().ok_or(DashboardError::NotConnected)
    }

    /// Creates or updates the scan setting binding `options.name`
    pub async fn create_scan(&self, namespace: &str, options: &ScanOptions) -> Result<(), DashboardError> {
        let client = self.connected()?;
        if options.name.trim().is_empty() || options.profile.trim().is_empty() {
            return Err(DashboardError::InvalidRequest("scan name and profile are required".to_string()));
        }

        let binding = scan_setting_binding(namespace, options);
        let gvr = resources::compliance(resources::SCAN_SETTING_BINDINGS);
        let verb = if upsert(client, &gvr, namespace, binding).await? { "Created" } else { "Updated" };
        info!(namespace, name = %options.name, profile = %options.profile, "{verb} scan setting binding");
        Ok(())
    }

    /// Writes the `periodic-setting` ScanSetting with `options.schedule` and
    /// binds the requested profiles to it. Profiles whose name contains `e8`
    /// go to `periodic-e8`, the rest to `cis-scan`. Every record is created or
    /// updated in place.
    pub async fn create_periodic_scan(
        &self,
        namespace: &str,
        options: &PeriodicScanOptions,
    ) -> Result<PeriodicScan, DashboardError> {
        let client = self.connected()?;
        validate_schedule(&options.schedule)?;
        if options.profiles.iter().all(|profile| profile.trim().is_empty()) {
            return Err(DashboardError::InvalidRequest("at least one profile is required".to_string()));
        }

        let setting = periodic_setting(namespace, options);
        upsert(client, &resources::compliance(resources::SCAN_SETTINGS), namespace, setting).await?;
        info!(namespace, schedule = %options.schedule, "Periodic scan setting written");

        let (e8, other): (Vec<String>, Vec<String>) = options
            .profiles
            .iter()
            .map(|profile| profile.trim())
            .filter(|profile| !profile.is_empty())
            .map(str::to_string)
            .partition(|profile| profile.contains("e8"));

        let gvr = resources::compliance(resources::SCAN_SETTING_BINDINGS);
        let mut bindings = Vec::new();
        for (name, profiles) in [(PERIODIC_E8_BINDING, e8), (PERIODIC_CIS_BINDING, other)] {
            if profiles.is_empty() {
                continue;
            }
            upsert(client, &gvr, namespace, periodic_binding(namespace, name, &profiles)).await?;
            debug!(namespace, binding = name, ?profiles, "Periodic binding written");
            bindings.push(PeriodicBinding {
                name: name.to_string(),
                profiles,
            });
        }

        Ok(PeriodicScan {
            setting: PERIODIC_SETTING.to_string(),
            schedule: options.schedule.clone(),
            bindings,
        })
    }

    /// Binds every recommended profile. Per-profile failures are collected,
    /// not returned.
    pub async fn create_recommended_scans(&self, namespace: &str) -> Result<RecommendedScans, DashboardError> {
        self.connected()?;
        let mut outcome = RecommendedScans::default();
        for (name, profile) in RECOMMENDED_PROFILES {
            let options = ScanOptions {
                name: name.to_string(),
                profile: profile.to_string(),
                settings: None,
            };
            match self.create_scan(namespace, &options).await {
                Ok(()) => outcome.created.push(name.to_string()),
                Err(e) => {
                    warn!(namespace, profile, error = %e, "Recommended scan not created");
                    outcome.errors.push(format!("{profile}: {e}"));
                }
            }
        }
        Ok(outcome)
    }

    /// Annotates every scan of `suite` for a rerun. Returns how many were annotated.
    pub async fn rescan_suite(&self, namespace: &str, suite: &str) -> Result<usize, DashboardError> {
        let client = self.connected()?;
        let gvr = resources::compliance(resources::SCANS);
        let selector = format!("{SUITE_LABEL}={suite}");

        let scans = match client.list(&gvr, namespace, Some(&selector)).await {
            Ok(scans) => scans,
            Err(ClusterError::ResourceNotRecognized(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if scans.is_empty() {
            return Err(DashboardError::ScanNotFound(suite.to_string()));
        }

        let patch = json!({ "metadata": { "annotations": { RESCAN_ANNOTATION: "" } } });
        for scan in &scans {
            client.merge_patch(&gvr, namespace, scan.name(), &patch).await?;
            debug!(namespace, suite, scan = scan.name(), "Scan annotated for rescan");
        }
        info!(namespace, suite, scans = scans.len(), "Rescan requested");
        Ok(scans.len())
    }

    /// Deletes suite `name` and its binding. Records already gone are fine.
    pub async fn delete_scan(&self, namespace: &str, name: &str) -> Result<(), DashboardError> {
        let client = self.connected()?;
        let release = json!({ "metadata": { "finalizers": null } });

        let suites = resources::compliance(resources::SUITES);
        tolerate_missing(client.merge_patch(&suites, namespace, name, &release).await.map(|_| ()))?;
        tolerate_missing(client.delete(&suites, namespace, name).await)?;

        let bindings = resources::compliance(resources::SCAN_SETTING_BINDINGS);
        if let Err(e) = tolerate_missing(client.delete(&bindings, namespace, name).await) {
            warn!(namespace, name, error = %e, "Could not delete scan setting binding");
        }
        info!(namespace, name, "Scan deleted");
        Ok(())
    }

    /// Every suite with its conditions and the detail of each of its scans
    pub async fn scan_status(&self, namespace: &str) -> Result<Vec<SuiteStatus>, DashboardError> {
        let client = self.connected()?;

        let suites = match client
            .list(&resources::compliance(resources::SUITES), namespace, None)
            .await
        {
            Ok(suites) => suites,
            Err(ClusterError::ResourceNotRecognized(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let details: HashMap<String, ScanStatus> = match client
            .list(&resources::compliance(resources::SCANS), namespace, None)
            .await
        {
            Ok(scans) => scans.iter().map(|scan| (scan.name().to_string(), scan_detail(scan))).collect(),
            Err(e) => {
                warn!(namespace, error = %e, "Listing scans failed, suite detail limited");
                HashMap::new()
            }
        };

        Ok(suites.iter().map(|suite| suite_status(suite, &details)).collect())
    }

    pub async fn list_profiles(&self, namespace: &str) -> Result<Vec<ProfileInfo>, DashboardError> {
        let client = self.connected()?;
        let profiles = match client
            .list(&resources::compliance(resources::PROFILES), namespace, None)
            .await
        {
            Ok(profiles) => profiles,
            Err(ClusterError::ResourceNotRecognized(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(profiles
            .iter()
            .map(|profile| ProfileInfo {
                name: profile.name().to_string(),
                title: profile.nested_string(&["title"]),
                description: profile.nested_string(&["description"]),
            })
            .collect())
    }
}

/// Creates `doc`, or updates it at the current resource version when it
/// exists. Returns true when created.
async fn upsert(client: &dyn ClusterClientTrait, gvr: &Gvr, namespace: &str, mut doc: Document) -> Result<bool, ClusterError> {
    match client.create(gvr, namespace, &doc).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_already_exists() => {
            let current = client.get(gvr, namespace, doc.name()).await?;
            if let Some(version) = current.resource_version() {
                doc.set_resource_version(version);
            }
            client.update(gvr, namespace, &doc).await?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Five whitespace-separated cron fields
fn validate_schedule(schedule: &str) -> Result<(), DashboardError> {
    let fields = schedule.split_whitespace().count();
    if fields == 5 {
        Ok(())
    } else {
        Err(DashboardError::InvalidRequest(format!(
            "schedule must have 5 cron fields, got {fields}: {schedule:?}"
        )))
    }
}

fn periodic_setting(namespace: &str, options: &PeriodicScanOptions) -> Document {
    let defaults = PeriodicScanOptions::default();
    let roles = if options.roles.is_empty() { &defaults.roles } else { &options.roles };

    let mut setting = Document::with_type(COMPLIANCE_API_VERSION, "ScanSetting", PERIODIC_SETTING);
    setting.set_namespace(namespace);
    setting.set_nested(&["schedule"], json!(options.schedule));
    setting.set_nested(&["roles"], json!(roles));

    if let Some(storage_class) = options.storage_class_name.as_deref().filter(|class| !class.is_empty()) {
        let size = if options.storage_size.is_empty() { &defaults.storage_size } else { &options.storage_size };
        let rotation = if options.rotation == 0 { defaults.rotation } else { options.rotation };
        setting.set_nested(
            &["rawResultStorage"],
            json!({
                "storageClassName": storage_class,
                "size": size,
                "rotation": rotation,
                "tolerations": [
                    { "key": "node-role.kubernetes.io/master", "operator": "Exists", "effect": "NoSchedule" },
                    {
                        "key": "node.kubernetes.io/not-ready",
                        "operator": "Exists",
                        "effect": "NoExecute",
                        "tolerationSeconds": 300
                    },
                    {
                        "key": "node.kubernetes.io/unreachable",
                        "operator": "Exists",
                        "effect": "NoExecute",
                        "tolerationSeconds": 300
                    },
                    { "key": "node.kubernetes.io/memory-pressure", "operator": "Exists", "effect": "NoSchedule" },
                ],
            }),
        );
    }
    setting
}

fn periodic_binding(namespace: &str, name: &str, profiles: &[String]) -> Document {
    let mut binding = Document::with_type(COMPLIANCE_API_VERSION, "ScanSettingBinding", name);
    binding.set_namespace(namespace);
    let profiles: Vec<Value> = profiles
        .iter()
        .map(|profile| json!({ "apiGroup": COMPLIANCE_API_VERSION, "kind": "Profile", "name": profile }))
        .collect();
    binding.set_nested(&["profiles"], Value::Array(profiles));
    binding.set_nested(
        &["settingsRef"],
        json!({ "apiGroup": COMPLIANCE_API_VERSION, "kind": "ScanSetting", "name": PERIODIC_SETTING }),
    );
    binding
}

fn tolerate_missing(result: Result<(), ClusterError>) -> Result<(), ClusterError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn scan_setting_binding(namespace: &str, options: &ScanOptions) -> Document {
    let mut binding = Document::with_type(COMPLIANCE_API_VERSION, "ScanSettingBinding", &options.name);
    binding.set_namespace(namespace);
    binding.set_nested(
        &["profiles"],
        json!([{ "apiGroup": COMPLIANCE_API_VERSION, "kind": "Profile", "name": options.profile }]),
    );
    binding.set_nested(
        &["settingsRef"],
        json!({
            "apiGroup": COMPLIANCE_API_VERSION,
            "kind": "ScanSetting",
            "name": options.settings.as_deref().unwrap_or(DEFAULT_SCAN_SETTING),
        }),
    );
    binding
}

fn scan_detail(scan: &Document) -> ScanStatus {
    ScanStatus {
        name: scan.name().to_string(),
        phase: scan.nested_string(&["status", "phase"]),
        result: scan.nested_string(&["status", "result"]),
        profile: scan.nested_string(&["spec", "profile"]),
        scan_type: scan.nested_string(&["spec", "scanType"]),
        content_image: scan.nested_string(&["spec", "contentImage"]),
        start_timestamp: scan.nested_string(&["status", "startTimestamp"]),
        end_timestamp: scan.nested_string(&["status", "endTimestamp"]),
        warnings: scan.nested_string(&["status", "warnings"]),
    }
}

fn field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn suite_status(suite: &Document, details: &HashMap<String, ScanStatus>) -> SuiteStatus {
    let conditions = suite
        .nested_slice(&["status", "conditions"])
        .iter()
        .filter(|c| c.is_object())
        .map(|c| Condition {
            condition_type: field(c, "type"),
            status: field(c, "status"),
            reason: field(c, "reason"),
            last_transition_time: field(c, "lastTransitionTime"),
        })
        .collect();

    // Suites only carry name and phase per scan; the scan record has the rest
    let scans = suite
        .nested_slice(&["status", "scanStatuses"])
        .iter()
        .filter(|s| s.is_object())
        .map(|s| {
            let name = field(s, "name");
            details.get(&name).cloned().unwrap_or_else(|| ScanStatus {
                phase: field(s, "phase"),
                name,
                ..Default::default()
            })
        })
        .collect();

    SuiteStatus {
        name: suite.name().to_string(),
        phase: suite.nested_string(&["status", "phase"]),
        result: suite.nested_string(&["status", "result"]),
        created_at: suite.nested_string(&["metadata", "creationTimestamp"]),
        scans,
        conditions,
    }
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod scan_test;
