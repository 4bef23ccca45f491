//! Trust policy types for module admission.
//!
//! The concrete signature scheme lives behind [`TrustVerifier`]; this module
//! only fixes the accept/reject contract per enforcement mode.

use serde::{Deserialize, Serialize};

use super::WrapperModule;

/// Outcome of the signature/origin verification for one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustClassification {
    /// Signature verified against a trusted origin.
    Trusted,
    /// No signature present.
    Unsigned,
    /// Signature present but does not verify.
    Tampered,
}

/// Admission decision for a (policy, classification) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    AdmitWithWarning,
    Reject,
}

/// Enforcement mode, fixed at loader construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Unsigned or tampered modules fail registration.
    #[default]
    RejectUnsigned,
    /// Anything not trusted is admitted with a warning.
    WarnUnsigned,
    /// Everything is admitted silently.
    AllowAll,
}

impl TrustPolicy {
    /// Admission decision for a classification under this mode.
    pub fn admission(self, classification: TrustClassification) -> Admission {
        match (self, classification) {
            (_, TrustClassification::Trusted) => Admission::Admit,
            (TrustPolicy::RejectUnsigned, _) => Admission::Reject,
            (TrustPolicy::WarnUnsigned, _) => Admission::AdmitWithWarning,
            (TrustPolicy::AllowAll, _) => Admission::Admit,
        }
    }
}

/// Pluggable signature/origin verification.
pub trait TrustVerifier: Send + Sync {
    fn classify(&self, module: &dyn WrapperModule) -> TrustClassification;
}

/// Verifier backed by a fixed allow list of module names.
///
/// Suitable for embedders that verify signatures out of band; everything not
/// listed is reported unsigned.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustVerifier {
    trusted: Vec<String>,
}

impl StaticTrustVerifier {
    pub fn new(trusted: impl IntoIterator<Item = String>) -> Self {
        Self {
            trusted: trusted.into_iter().collect(),
        }
    }
}

impl TrustVerifier for StaticTrustVerifier {
    fn classify(&self, module: &dyn WrapperModule) -> TrustClassification {
        if self.trusted.iter().any(|name| name == module.name()) {
            TrustClassification::Trusted
        } else {
            TrustClassification::Unsigned
        }
    }
}
