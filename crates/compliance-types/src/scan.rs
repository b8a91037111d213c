//! Scan lifecycle request and response types

use serde::{Deserialize, Serialize};

/// Request to bind a profile to scan settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub name: String,
    pub profile: String,
    /// ScanSetting to reference; `default` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Outcome of creating the recommended scan bindings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecommendedScans {
    pub created: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Request for recurring scans sharing one schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicScanOptions {
    /// Five-field cron expression
    pub schedule: String,
    pub profiles: Vec<String>,
    pub roles: Vec<String>,
    /// Keeps raw results on a volume of this class when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    pub storage_size: String,
    /// Number of raw result sets kept
    pub rotation: u32,
}

impl Default for PeriodicScanOptions {
    fn default() -> Self {
        Self {
            schedule: "0 1 * * *".to_string(),
            profiles: vec!["ocp4-cis".to_string(), "ocp4-e8".to_string(), "rhcos4-e8".to_string()],
            roles: vec!["worker".to_string(), "master".to_string()],
            storage_class_name: None,
            storage_size: "1Gi".to_string(),
            rotation: 3,
        }
    }
}

/// Records written for a periodic scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicScan {
    pub setting: String,
    pub schedule: String,
    /// Binding name and the profiles it covers
    pub bindings: Vec<PeriodicBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicBinding {
    pub name: String,
    pub profiles: Vec<String>,
}
