//! Authorization outcome errors.
//!
//! Every authentication request resolves exactly once: either with a verdict
//! (`Ok(true)` gained, `Ok(false)` denied) or with one of the errors below.
//! A denied challenge is an outcome the authority asked for, not a fault, so
//! it never appears in this taxonomy.

use thiserror::Error;

/// Errors that resolve an authentication request without a verdict.
///
/// Action and identity rejections resolve synchronously, before any session
/// exists. `Cancelled` and `PromptChannelUnavailable` arrive through session
/// teardown and always travel through the pending result, never past it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The request named an action this agent does not serve.
    #[error("unsupported action: {action_id}")]
    UnsupportedAction {
        /// The action id the authority asked for.
        action_id: String,
    },

    /// No offered identity can answer a challenge through this agent.
    #[error("cannot reauthorize identity(s): {rejected}")]
    IdentityNotSupported {
        /// Display of every rejected candidate, for diagnostics.
        rejected: String,
    },

    /// The session was torn down before the challenge concluded.
    ///
    /// Raised by the authority's cancellation token, cookie reuse, registry
    /// eviction, and broker shutdown alike.
    #[error("authentication was cancelled")]
    Cancelled,

    /// The remote prompt channel failed while this session needed it.
    ///
    /// Affects only the session whose prompt could not be delivered; other
    /// sessions keep running.
    #[error("remote prompt channel unavailable: {reason}")]
    PromptChannelUnavailable {
        /// Description of the channel failure.
        reason: String,
    },
}

impl AuthorizationError {
    /// Create an unsupported-action error.
    #[must_use]
    pub fn unsupported_action(action_id: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            action_id: action_id.into(),
        }
    }

    /// Create a prompt-channel-unavailable error.
    #[must_use]
    pub fn prompt_channel_unavailable(reason: impl Into<String>) -> Self {
        Self::PromptChannelUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns a stable machine-readable name for this error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedAction { .. } => "unsupported_action",
            Self::IdentityNotSupported { .. } => "identity_not_supported",
            Self::Cancelled => "cancelled",
            Self::PromptChannelUnavailable { .. } => "prompt_channel_unavailable",
        }
    }
}

/// Resolution of one authentication request.
///
/// `Ok(true)` means the identity gained authorization, `Ok(false)` means the
/// challenge concluded with authorization refused.
pub type AuthorizationOutcome = Result<bool, AuthorizationError>;
