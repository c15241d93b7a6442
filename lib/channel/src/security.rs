//! Webhook security validation results and the retest gate.

use amber_relay_workflow::CoverageStatus;
use serde::{Deserialize, Serialize};

/// Certificates expiring in fewer days than this block the policy.
pub const CERT_BLOCKING_DAYS: i64 = 30;

/// Uniqueness check of the webhook secret across the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretCheck {
    pub is_unique: bool,
    #[serde(default)]
    pub conflicts: Vec<String>,
}

/// Validation result for the uploaded webhook certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateCheck {
    #[serde(default)]
    pub status: String,
    pub days_remaining: i64,
}

/// Backend response of `security/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySnapshot {
    pub secret: SecretCheck,
    #[serde(default)]
    pub certificate: Option<CertificateCheck>,
}

impl SecuritySnapshot {
    /// The message blocking a save, if any.
    ///
    /// A reused secret always wins over certificate problems.
    #[must_use]
    pub fn blocking_message(&self) -> Option<String> {
        if !self.secret.is_unique {
            return Some(if self.secret.conflicts.is_empty() {
                "webhook secret is already in use by another workflow".to_string()
            } else {
                format!(
                    "webhook secret is already in use by: {}",
                    self.secret.conflicts.join(", ")
                )
            });
        }
        if let Some(cert) = &self.certificate {
            if cert.days_remaining < CERT_BLOCKING_DAYS {
                return Some(format!(
                    "webhook certificate expires in {} days; rotate it before saving",
                    cert.days_remaining
                ));
            }
        }
        None
    }
}

/// Whether a policy change demands a fresh coverage run before publish.
///
/// True when security validation is blocking, or when the secret has ever
/// been rotated and coverage is not green.
#[must_use]
pub fn requires_retest(
    snapshot: Option<&SecuritySnapshot>,
    coverage: CoverageStatus,
    secret_version: u32,
) -> bool {
    if snapshot.is_some_and(|s| s.blocking_message().is_some()) {
        return true;
    }
    coverage != CoverageStatus::Green && secret_version > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_secret() -> SecretCheck {
        SecretCheck {
            is_unique: true,
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn reused_secret_blocks_and_names_conflicts() {
        let snapshot = SecuritySnapshot {
            secret: SecretCheck {
                is_unique: false,
                conflicts: vec!["wf-2".to_string(), "wf-7".to_string()],
            },
            certificate: None,
        };
        let message = snapshot.blocking_message().expect("blocked");
        assert!(message.contains("wf-2, wf-7"));
    }

    #[test]
    fn reused_secret_outranks_expiring_certificate() {
        let snapshot = SecuritySnapshot {
            secret: SecretCheck {
                is_unique: false,
                conflicts: Vec::new(),
            },
            certificate: Some(CertificateCheck {
                status: "expiring".to_string(),
                days_remaining: 3,
            }),
        };
        let message = snapshot.blocking_message().expect("blocked");
        assert!(message.contains("secret"));
    }

    #[test]
    fn certificate_blocks_under_thirty_days() {
        let mut snapshot = SecuritySnapshot {
            secret: unique_secret(),
            certificate: Some(CertificateCheck {
                status: "valid".to_string(),
                days_remaining: 29,
            }),
        };
        assert!(snapshot.blocking_message().is_some());

        snapshot.certificate = Some(CertificateCheck {
            status: "valid".to_string(),
            days_remaining: 30,
        });
        assert!(snapshot.blocking_message().is_none());
    }

    #[test]
    fn retest_required_when_secret_rotated_and_coverage_not_green() {
        assert!(requires_retest(None, CoverageStatus::Yellow, 1));
        assert!(!requires_retest(None, CoverageStatus::Green, 1));
        assert!(!requires_retest(None, CoverageStatus::Unknown, 0));
    }

    #[test]
    fn retest_required_when_validation_blocks() {
        let snapshot = SecuritySnapshot {
            secret: SecretCheck {
                is_unique: false,
                conflicts: Vec::new(),
            },
            certificate: None,
        };
        assert!(requires_retest(Some(&snapshot), CoverageStatus::Green, 0));
    }
}
