//! Compiled-in versions and the annotations that record what is installed.

use std::collections::BTreeMap;

/// Version of this operator build.
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Platform release deployed by this operator build.
pub const THREESCALE_RELEASE: &str = "2.7";

/// Annotation holding the installed platform release.
pub const THREESCALE_VERSION_ANNOTATION: &str = "apps.3scale.net/apimanager-threescale-version";

/// Annotation holding the operator version that last reconciled the resource.
pub const OPERATOR_VERSION_ANNOTATION: &str = "apps.3scale.net/threescale-operator-version";

/// Operator version and platform release a control loop runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub operator: String,
    pub release: String,
}

impl VersionInfo {
    pub fn new(operator: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            release: release.into(),
        }
    }

    /// Versions compiled into this binary.
    pub fn compiled() -> Self {
        Self::new(OPERATOR_VERSION, THREESCALE_RELEASE)
    }

    /// Writes both version annotations.
    pub fn stamp(&self, annotations: &mut BTreeMap<String, String>) {
        annotations.insert(
            THREESCALE_VERSION_ANNOTATION.to_string(),
            self.release.clone(),
        );
        annotations.insert(
            OPERATOR_VERSION_ANNOTATION.to_string(),
            self.operator.clone(),
        );
    }
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self::compiled()
    }
}

/// Installed versions recorded on a resource.
///
/// Returns `None` unless both annotations are present and non-empty.
pub fn installed(annotations: Option<&BTreeMap<String, String>>) -> Option<VersionInfo> {
    let annotations = annotations?;
    let operator = annotations
        .get(OPERATOR_VERSION_ANNOTATION)
        .filter(|v| !v.is_empty())?;
    let release = annotations
        .get(THREESCALE_VERSION_ANNOTATION)
        .filter(|v| !v.is_empty())?;
    Some(VersionInfo::new(operator.clone(), release.clone()))
}
