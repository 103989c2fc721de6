//! Outcome classification of a 3-D Secure result.
//!
//! Only `mdStatus == "1"` together with `status == "success"` may proceed to
//! completion. Every other combination, including codes missing from
//! [`MD_STATUS_REASONS`], terminates the attempt as a failure.

pub const PROCEED_MD_STATUS: &str = "1";
pub const PROCEED_STATUS: &str = "success";

pub const MD_STATUS_REASONS: &[(&str, &str)] = &[
    ("0", "signature/verification failed by issuer"),
    ("2", "cardholder/issuer not enrolled"),
    ("3", "issuing bank not enrolled"),
    ("4", "enrollment deferred"),
    ("5", "verification unavailable"),
    ("6", "protocol error"),
    ("7", "system error"),
    ("8", "unknown card"),
];

pub const MALFORMED_STATUS_CODE: &str = "THREEDS_MALFORMED_STATUS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Proceed,
    Reject { code: String, reason: String },
    /// `mdStatus` is not a gateway code at all.
    Malformed { code: String, reason: String },
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Proceed => "proceed",
            Classification::Reject { .. } => "reject",
            Classification::Malformed { .. } => "malformed",
        }
    }
}

pub fn md_status_reason(md_status: &str) -> Option<&'static str> {
    MD_STATUS_REASONS
        .iter()
        .find(|(code, _)| *code == md_status)
        .map(|(_, reason)| *reason)
}

pub fn classify(md_status: &str, status: &str) -> Classification {
    if md_status == PROCEED_MD_STATUS && status == PROCEED_STATUS {
        return Classification::Proceed;
    }

    if md_status.is_empty() || md_status.len() > 3 || !md_status.chars().all(|c| c.is_ascii_digit())
    {
        return Classification::Malformed {
            code: MALFORMED_STATUS_CODE.to_string(),
            reason: "unrecognized 3-D Secure status".to_string(),
        };
    }

    let reason = match md_status_reason(md_status) {
        Some(reason) => reason.to_string(),
        None if md_status == PROCEED_MD_STATUS => {
            format!("authentication passed but payment status was '{}'", status)
        }
        None => format!("3-D Secure verification failed (mdStatus {})", md_status),
    };

    Classification::Reject {
        code: format!("THREEDS_FAILED_{}", md_status),
        reason,
    }
}
