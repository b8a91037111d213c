//! Addresses of the cluster resource kinds the dashboard works with

use cluster_client::Gvr;

pub const COMPLIANCE_GROUP: &str = "compliance.openshift.io";
pub const COMPLIANCE_VERSION: &str = "v1alpha1";
/// `apiVersion` of every compliance record
pub const COMPLIANCE_API_VERSION: &str = "compliance.openshift.io/v1alpha1";

const OLM_GROUP: &str = "operators.coreos.com";

pub const CHECK_RESULTS: &str = "compliancecheckresults";
pub const REMEDIATIONS: &str = "complianceremediations";
pub const SUITES: &str = "compliancesuites";
pub const SCANS: &str = "compliancescans";
pub const SCAN_SETTING_BINDINGS: &str = "scansettingbindings";
pub const SCAN_SETTINGS: &str = "scansettings";
pub const PROFILE_BUNDLES: &str = "profilebundles";
pub const PROFILES: &str = "profiles";

/// A `compliance.openshift.io/v1alpha1` resource
#[must_use]
pub fn compliance(resource: &str) -> Gvr {
    Gvr::new(COMPLIANCE_GROUP, COMPLIANCE_VERSION, resource)
}

#[must_use]
pub fn subscriptions() -> Gvr {
    Gvr::new(OLM_GROUP, "v1alpha1", "subscriptions")
}

#[must_use]
pub fn cluster_service_versions() -> Gvr {
    Gvr::new(OLM_GROUP, "v1alpha1", "clusterserviceversions")
}

#[must_use]
pub fn catalog_sources() -> Gvr {
    Gvr::new(OLM_GROUP, "v1alpha1", "catalogsources")
}

#[must_use]
pub fn operator_groups() -> Gvr {
    Gvr::new(OLM_GROUP, "v1", "operatorgroups")
}

#[must_use]
pub fn package_manifests() -> Gvr {
    Gvr::new("packages.operators.coreos.com", "v1", "packagemanifests")
}

#[must_use]
pub fn machine_config_pools() -> Gvr {
    Gvr::new("machineconfiguration.openshift.io", "v1", "machineconfigpools")
}
