//! Error types for fibers.

use super::FiberId;

/// Returned by a suspension point that observed an interruption request.
///
/// Code that receives it is expected to clean up and propagate it with `?`,
/// so that the fiber's exit reports the interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("fiber {fiber} was interrupted")]
pub struct Interrupted {
    /// The fiber that observed the interruption.
    pub fiber: FiberId,
}

/// Abnormal exit of a joined fiber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FiberError {
    /// The fiber stopped because it was interrupted.
    #[error("fiber {0} was interrupted")]
    Interrupted(FiberId),

    /// The fiber panicked; the payload is rendered as text.
    #[error("fiber {fiber} panicked: {message}")]
    Panicked {
        /// The fiber that panicked.
        fiber: FiberId,
        /// The panic message.
        message: String,
    },
}

impl FiberError {
    /// The fiber this error is about.
    #[must_use]
    pub const fn fiber(&self) -> FiberId {
        match self {
            Self::Interrupted(fiber) | Self::Panicked { fiber, .. } => *fiber,
        }
    }

    /// Returns `true` for [`FiberError::Interrupted`].
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

impl From<Interrupted> for FiberError {
    fn from(interrupted: Interrupted) -> Self {
        Self::Interrupted(interrupted.fiber)
    }
}
