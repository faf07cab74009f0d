//! The outcome of one admission check.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Summary of a single admission decision.
///
/// Built fresh on every call and never mutated afterwards. `retry_after` is
/// only set on denials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the call may proceed
    pub admitted: bool,
    /// Admissions left before the next denial
    pub remaining: u64,
    /// When the quota structurally refreshes, in clock seconds
    pub reset_at: f64,
    /// Minimum wait before a retry could succeed
    #[serde(serialize_with = "serialize_secs")]
    pub retry_after: Option<Duration>,
}

impl Decision {
    pub(crate) fn admit(remaining: u64, reset_at: f64) -> Self {
        Self {
            admitted: true,
            remaining,
            reset_at,
            retry_after: None,
        }
    }

    pub(crate) fn deny(remaining: u64, reset_at: f64, retry_after_secs: f64) -> Self {
        Self {
            admitted: false,
            remaining,
            reset_at,
            retry_after: Some(
                Duration::try_from_secs_f64(retry_after_secs.max(0.0)).unwrap_or(Duration::MAX),
            ),
        }
    }

    /// Whether the call may proceed.
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// `retry_after` in fractional seconds.
    pub fn retry_after_secs(&self) -> Option<f64> {
        self.retry_after.map(|d| d.as_secs_f64())
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.admitted {
            write!(
                f,
                "admitted (remaining: {}, reset at: {:.3})",
                self.remaining, self.reset_at
            )
        } else {
            write!(
                f,
                "denied (reset at: {:.3}, retry after: {:.3}s)",
                self.reset_at,
                self.retry_after_secs().unwrap_or_default()
            )
        }
    }
}

fn serialize_secs<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}
