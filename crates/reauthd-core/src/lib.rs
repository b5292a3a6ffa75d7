//! reauthd-core - Domain vocabulary for the reauthd authentication agent.
//!
//! This crate carries everything the broker runtime and its host agree on:
//! the request types handed over by the privilege authority, the identity
//! model with caller eligibility, the capability traits the agent consumes
//! (authority registration, interactive challenges, the remote prompt
//! channel), the authorization error taxonomy, and the agent configuration.
//!
//! The runtime itself lives in `reauthd-agent`; this crate has no event loop
//! and spawns no tasks.
//!
//! # Modules
//!
//! - [`authority`]: Request vocabulary and the registration capability
//! - [`challenge`]: Interactive challenge capability and its event stream
//! - [`config`]: TOML agent configuration with fail-closed validation
//! - [`error`]: Authorization outcome taxonomy
//! - [`identity`]: Candidate identities and caller eligibility
//! - [`prompt`]: Remote prompt channel capability and the answer path

pub mod authority;
pub mod challenge;
pub mod config;
pub mod error;
pub mod identity;
pub mod prompt;

// Re-export main types
pub use authority::{
    AuthenticationRequest, Authority, AuthorityError, Cookie, RegistrationHandle, SessionSubject,
    SUPPORTED_ACTION_ID,
};
pub use challenge::{
    Challenge, ChallengeEvent, ChallengeEventSender, ChallengeEventStream, ChallengeFactory,
    TaggedChallengeEvent,
};
pub use config::{AgentConfig, ConfigError};
pub use error::{AuthorizationError, AuthorizationOutcome};
pub use identity::{CandidateIdentity, ResolvedIdentity};
pub use prompt::{
    PromptAnswer, PromptAnswerSender, PromptAnswerStream, PromptChannel, PromptChannelError,
    PromptHandle, PromptReply, PromptRequest,
};
