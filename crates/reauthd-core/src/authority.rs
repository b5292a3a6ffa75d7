//! Authority-facing request types and the registration capability.
//!
//! The privilege authority is an opaque trusted collaborator: it verifies
//! answers and makes the authorization decision. This module carries the
//! vocabulary it hands over per request (action id, cookie, candidate
//! identities, cancellation) and the trait through which the agent registers
//! itself to receive those requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::identity::CandidateIdentity;

/// The single action this agent serves.
///
/// Requests naming any other action are rejected before a session exists.
pub const SUPPORTED_ACTION_ID: &str = "dev.reauthd.privileged-bridge";

/// Opaque per-request key issued by the authority.
///
/// The cookie names one authentication request for its whole lifetime and is
/// the registry key. The agent never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(String);

impl Cookie {
    /// Wrap an authority-issued cookie value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw cookie value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One authentication request handed over by the authority.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest {
    /// Action the authority wants re-authorized.
    pub action_id: String,

    /// Human-readable description of why authentication is needed.
    ///
    /// Logged for diagnostics; the remote client renders its own text.
    pub message: String,

    /// Identities permitted to answer, in authority order.
    pub identities: Vec<CandidateIdentity>,

    /// Key for this request; also the registry key of its session.
    pub cookie: Cookie,

    /// Fires when the authority abandons the request.
    pub cancellation: CancellationToken,
}

/// The process on whose behalf the agent registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSubject {
    /// Process id of the registering process.
    pub pid: i32,
    /// Uid the registering process runs as.
    pub uid: u32,
}

impl SessionSubject {
    /// Subject describing the calling process.
    #[must_use]
    pub fn for_current_process() -> Self {
        Self {
            pid: nix::unistd::getpid().as_raw(),
            uid: nix::unistd::getuid().as_raw(),
        }
    }
}

impl fmt::Display for SessionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unix-process:{}:{}", self.pid, self.uid)
    }
}

/// Proof of a live authority registration.
///
/// Returned by [`Authority::register_agent`] and surrendered back through
/// [`Authority::unregister_agent`]; deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub struct RegistrationHandle {
    id: u64,
}

impl RegistrationHandle {
    /// Create a handle with an authority-chosen id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }

    /// Returns the authority-chosen id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// Errors the authority can raise during registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// An agent is already registered for this subject.
    ///
    /// Expected when two bridges race for the same login session; logged
    /// quietly and never fatal.
    #[error("an authentication agent already exists for this subject")]
    AlreadyRegistered,

    /// The authority rejected the registration.
    #[error("registration rejected: {reason}")]
    Rejected {
        /// Authority-provided rejection reason.
        reason: String,
    },

    /// The authority could not be reached.
    #[error("authority unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
}

impl AuthorityError {
    /// Create a rejection error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Registration surface of the privilege authority.
///
/// Implementations wrap the real authority connection; tests substitute
/// recording fakes. Registration failures are surfaced to the caller and
/// are never fatal to the agent itself.
pub trait Authority: Send {
    /// Registers the agent for `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::AlreadyRegistered`] when the subject already
    /// has an agent, or another variant when the authority refuses or cannot
    /// be reached.
    fn register_agent(
        &mut self,
        subject: &SessionSubject,
    ) -> Result<RegistrationHandle, AuthorityError>;

    /// Releases a registration previously returned by
    /// [`register_agent`](Authority::register_agent).
    fn unregister_agent(&mut self, handle: RegistrationHandle);
}
