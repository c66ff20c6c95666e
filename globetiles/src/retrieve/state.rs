//! Retriever lifecycle states.

use std::fmt;

/// Lifecycle of a retriever.
///
/// ```text
/// NotStarted -> Started -> Connecting -> Reading -> Successful
///                                                 \-> Error
///                                                 \-> Interrupted
/// ```
///
/// `Error` and `Interrupted` may also be reached from any earlier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetrieverState {
    #[default]
    NotStarted,
    Started,
    Connecting,
    Reading,
    Successful,
    Error,
    Interrupted,
}

impl RetrieverState {
    /// Whether the retriever has finished, one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Error | Self::Interrupted)
    }
}

impl fmt::Display for RetrieverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Connecting => "connecting",
            Self::Reading => "reading",
            Self::Successful => "successful",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}
