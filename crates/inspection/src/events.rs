//! Events published after an inspection commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use readiness_catalog::ProductId;
use readiness_core::TenantId;
use readiness_events::Event;

use crate::rules::CheckKind;

/// `subject_type` of inspection event envelopes.
pub const INSPECTION_SUBJECT: &str = "inspection";

/// A sub-record moved between passed and not passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTransition {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub check_kind: CheckKind,
    /// Signal name from the check registry (e.g. "inspection.has_images.passed").
    pub signal: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// One of the aggregate flags flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlip {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectionEvent {
    CheckPassed(CheckTransition),
    CheckFailed(CheckTransition),
    MissingInfoDetected(ReadinessFlip),
    MissingInfoResolved(ReadinessFlip),
    MissingOptionalInfoDetected(ReadinessFlip),
    MissingOptionalInfoResolved(ReadinessFlip),
}

impl InspectionEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::CheckPassed(t) | Self::CheckFailed(t) => t.tenant_id,
            Self::MissingInfoDetected(f)
            | Self::MissingInfoResolved(f)
            | Self::MissingOptionalInfoDetected(f)
            | Self::MissingOptionalInfoResolved(f) => f.tenant_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            Self::CheckPassed(t) | Self::CheckFailed(t) => t.product_id,
            Self::MissingInfoDetected(f)
            | Self::MissingInfoResolved(f)
            | Self::MissingOptionalInfoDetected(f)
            | Self::MissingOptionalInfoResolved(f) => f.product_id,
        }
    }

    pub fn check_kind(&self) -> Option<CheckKind> {
        match self {
            Self::CheckPassed(t) | Self::CheckFailed(t) => Some(t.check_kind),
            _ => None,
        }
    }

    /// Whether this event flips `has_missing_required`; other products'
    /// structural checks depend on that flag.
    pub fn flips_required(&self) -> bool {
        matches!(self, Self::MissingInfoDetected(_) | Self::MissingInfoResolved(_))
    }
}

impl Event for InspectionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::CheckPassed(_) => "inspection.check.passed",
            Self::CheckFailed(_) => "inspection.check.failed",
            Self::MissingInfoDetected(_) => "inspection.missing_info.detected",
            Self::MissingInfoResolved(_) => "inspection.missing_info.resolved",
            Self::MissingOptionalInfoDetected(_) => "inspection.missing_optional_info.detected",
            Self::MissingOptionalInfoResolved(_) => "inspection.missing_optional_info.resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::CheckPassed(t) | Self::CheckFailed(t) => t.occurred_at,
            Self::MissingInfoDetected(f)
            | Self::MissingInfoResolved(f)
            | Self::MissingOptionalInfoDetected(f)
            | Self::MissingOptionalInfoResolved(f) => f.occurred_at,
        }
    }
}
