//! Identity candidates and caller eligibility.
//!
//! The authority hands over the set of identities permitted to answer a
//! challenge. This agent can only drive a challenge on behalf of the process
//! it runs as, so eligibility means: a unix-user candidate whose uid equals
//! the local uid. Every other candidate is kept printable for diagnostics
//! and rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// One identity offered by the authority as permitted to answer a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateIdentity {
    /// A local user account.
    UnixUser {
        /// Numeric uid of the account.
        uid: u32,
        /// Account name, used when surfacing prompts.
        name: String,
    },

    /// A local group.
    ///
    /// Group challenges would require directory lookup, which is out of
    /// scope; group candidates are always rejected.
    UnixGroup {
        /// Numeric gid of the group.
        gid: u32,
    },

    /// Any identity kind this agent does not understand.
    Other {
        /// Authority-provided description of the candidate.
        descriptor: String,
    },
}

impl CandidateIdentity {
    /// Create a unix-user candidate.
    #[must_use]
    pub fn unix_user(uid: u32, name: impl Into<String>) -> Self {
        Self::UnixUser {
            uid,
            name: name.into(),
        }
    }

    /// Create a unix-group candidate.
    #[must_use]
    pub const fn unix_group(gid: u32) -> Self {
        Self::UnixGroup { gid }
    }

    /// Create a candidate of an unrecognized kind.
    #[must_use]
    pub fn other(descriptor: impl Into<String>) -> Self {
        Self::Other {
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for CandidateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixUser { uid, name } => write!(f, "unix-user:{name}({uid})"),
            Self::UnixGroup { gid } => write!(f, "unix-group:{gid}"),
            Self::Other { descriptor } => write!(f, "{descriptor}"),
        }
    }
}

/// The identity selected to answer a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Numeric uid, always equal to the caller uid that selected it.
    pub uid: u32,
    /// Account name surfaced alongside prompts.
    pub user_name: String,
}

/// Selects the unix-user candidate matching `caller_uid`.
///
/// Selection requires exactly one matching candidate. Zero matches means the
/// authority offered only identities this agent cannot act for; more than
/// one match is ambiguous and treated the same way. Candidate order never
/// affects the result.
///
/// # Errors
///
/// Returns [`AuthorizationError::IdentityNotSupported`] carrying a printable
/// rendering of every offered candidate when no unambiguous match exists.
pub fn select(
    candidates: &[CandidateIdentity],
    caller_uid: u32,
) -> Result<ResolvedIdentity, AuthorizationError> {
    let mut matched: Option<ResolvedIdentity> = None;
    let mut ambiguous = false;

    for candidate in candidates {
        if let CandidateIdentity::UnixUser { uid, name } = candidate {
            if *uid == caller_uid {
                if matched.is_some() {
                    ambiguous = true;
                } else {
                    matched = Some(ResolvedIdentity {
                        uid: *uid,
                        user_name: name.clone(),
                    });
                }
            }
        }
    }

    match matched {
        Some(identity) if !ambiguous => Ok(identity),
        _ => Err(AuthorizationError::IdentityNotSupported {
            rejected: render_candidates(candidates),
        }),
    }
}

/// Renders a candidate list for diagnostics.
fn render_candidates(candidates: &[CandidateIdentity]) -> String {
    if candidates.is_empty() {
        return "(none)".to_string();
    }
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}


// =============================================================================
// Proptest selection invariants
// =============================================================================
