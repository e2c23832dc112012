use std::fmt;

/// Why a stage produced a usable-but-degraded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegradeReason {
    /// Camera was acquired with the fixed low-resolution constraints
    ConstraintsRelaxed,
    /// Detector call failed (transport, status or parse); synthetic pose returned
    DetectionUnavailable,
    /// Detector found no person above the confidence floor; synthetic pose returned
    NoPersonDetected,
    /// Product model failed to load; primitive placeholder used
    ModelLoadFailure,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ConstraintsRelaxed => "camera constraints relaxed",
            Self::DetectionUnavailable => "detection unavailable",
            Self::NoPersonDetected => "no person detected",
            Self::ModelLoadFailure => "model load failure",
        };
        f.write_str(text)
    }
}

/// Result of a stage that can fall back instead of failing.
///
/// Fatal failures are carried by the surrounding `Result::Err`; an `Outcome`
/// always holds a value the pipeline can keep running with.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded { value: T, reason: DegradeReason },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: DegradeReason) -> Self {
        Self::Degraded { value, reason }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<DegradeReason> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded { reason, .. } => Some(*reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Ok(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
