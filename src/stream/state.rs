//! Stream lifecycle state machine
//!
//! ```text
//! NotInit <──> Init <──> Ready <──> Running
//! ```
//!
//! Only neighbouring states are reachable from each other.

use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle state of a stream, as seen by the stream layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamLocalState {
    /// Not initialized
    NotInit,
    /// Opened, port not yet attached
    Init,
    /// Attached and stopped
    Ready,
    /// Receiving frames
    Running,
}

impl StreamLocalState {
    /// Whether a stream in this state may move directly to `next`
    pub fn can_transition_to(self, next: StreamLocalState) -> bool {
        use StreamLocalState::*;

        matches!(
            (self, next),
            (NotInit, Init)
                | (Init, NotInit)
                | (Init, Ready)
                | (Ready, Init)
                | (Ready, Running)
                | (Running, Ready)
        )
    }

    /// Whether frames and component calls are still welcome in this state
    pub fn is_attached(self) -> bool {
        matches!(self, StreamLocalState::Ready | StreamLocalState::Running)
    }
}

impl TryFrom<i32> for StreamLocalState {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(StreamLocalState::NotInit),
            1 => Ok(StreamLocalState::Init),
            2 => Ok(StreamLocalState::Ready),
            3 => Ok(StreamLocalState::Running),
            _ => Err(Error::invalid_argument(format!("unknown state({})", value))),
        }
    }
}

impl fmt::Display for StreamLocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamLocalState::NotInit => "not-init",
            StreamLocalState::Init => "init",
            StreamLocalState::Ready => "ready",
            StreamLocalState::Running => "running",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use StreamLocalState::*;

    #[test]
    fn test_neighbour_transitions() {
        assert!(NotInit.can_transition_to(Init));
        assert!(Init.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Running));
        assert!(Running.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Init));
        assert!(Init.can_transition_to(NotInit));
    }

    #[test]
    fn test_skipping_transitions_rejected() {
        assert!(!NotInit.can_transition_to(Ready));
        assert!(!NotInit.can_transition_to(Running));
        assert!(!Init.can_transition_to(Running));
        assert!(!Running.can_transition_to(Init));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn test_from_raw_value() {
        assert_eq!(StreamLocalState::try_from(2).unwrap(), Ready);

        let err = StreamLocalState::try_from(9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.message().contains("unknown state"));
    }
}
