use crate::domain::errors::RejectCode;

/// Result of a single safety check, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub check: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    pub fn pass(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Immutable admission decision for one proposed order.
///
/// `checks` lists every check attempted, in the order they ran; on denial the
/// last entry is the failing one and `reject` identifies it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub checks: Vec<CheckOutcome>,
    pub reject: Option<RejectCode>,
}

impl Decision {
    pub fn approved(checks: Vec<CheckOutcome>) -> Self {
        Self {
            allowed: true,
            checks,
            reject: None,
        }
    }

    pub fn denied(checks: Vec<CheckOutcome>, reject: RejectCode) -> Self {
        Self {
            allowed: false,
            checks,
            reject: Some(reject),
        }
    }

    /// Human-readable detail of the first failing check, if any.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.checks
            .iter()
            .find(|c| !c.passed)
            .map(|c| c.detail.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_decision_exposes_reason() {
        let decision = Decision::denied(
            vec![
                CheckOutcome::pass("stop_loss", "Stop loss present"),
                CheckOutcome::fail("risk_per_trade", "Risk 5.00% > max 1.0%"),
            ],
            RejectCode::RiskPerTradeExceeded,
        );
        assert!(!decision.allowed);
        assert_eq!(decision.reject, Some(RejectCode::RiskPerTradeExceeded));
        assert_eq!(decision.rejection_reason(), Some("Risk 5.00% > max 1.0%"));
    }

    #[test]
    fn approved_decision_has_no_reason() {
        let decision = Decision::approved(vec![CheckOutcome::pass("stop_loss", "ok")]);
        assert!(decision.allowed);
        assert_eq!(decision.rejection_reason(), None);
    }
}
