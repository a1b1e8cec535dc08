use crate::CoreError;
use std::fmt;

/// One stage of the service lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    PreStart,
    Start,
    PostStart,
    Stop,
    PostStop,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::PreStart,
        Phase::Start,
        Phase::PostStart,
        Phase::Stop,
        Phase::PostStop,
    ];

    /// Phases run by `up`.
    pub const UP: [Phase; 3] = [Phase::PreStart, Phase::Start, Phase::PostStart];

    /// Phases run by `down`.
    pub const DOWN: [Phase; 2] = [Phase::Stop, Phase::PostStop];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PreStart => write!(f, "pre-start"),
            Phase::Start => write!(f, "start"),
            Phase::PostStart => write!(f, "post-start"),
            Phase::Stop => write!(f, "stop"),
            Phase::PostStop => write!(f, "post-stop"),
        }
    }
}

/// Check that `phases` follows the lifecycle order without repeats.
///
/// Gaps are allowed (`[PreStart, PostStart]` is fine); going backwards or
/// running a phase twice is not.
pub fn validate_sequence(phases: &[Phase]) -> Result<(), CoreError> {
    for pair in phases.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if to <= from {
            return Err(CoreError::InvalidPhaseOrder { from, to });
        }
    }
    Ok(())
}
