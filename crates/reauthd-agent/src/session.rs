//! One in-flight authentication conversation.
//!
//! A session owns the challenge helper for a single authority cookie and
//! tracks where the conversation stands:
//!
//! ```text
//!   Initiated ──hidden prompt──▶ AwaitingResponse
//!       ▲                             │
//!       └────────matching answer──────┘
//!
//!   any non-terminal ──Completed{gained}──▶ Completed
//!   any non-terminal ──cancel/evict/supersede/shutdown──▶ Cancelled
//! ```
//!
//! Teardown runs in a fixed release order and is idempotent, so the four
//! cancellation sources may overlap without double-resolving the caller or
//! retracting a prompt twice.

use reauthd_core::authority::Cookie;
use reauthd_core::challenge::Challenge;
use reauthd_core::error::AuthorizationOutcome;
use reauthd_core::identity::ResolvedIdentity;
use reauthd_core::prompt::PromptHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::PromptBridge;
use crate::pending::PendingResult;

/// Where one authentication conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Challenge helper is running; no prompt is outstanding.
    Initiated,
    /// A hidden prompt has been forwarded and its answer is outstanding.
    AwaitingResponse,
    /// The challenge finished and the caller saw the verdict.
    Completed,
    /// The session was torn down before the challenge finished.
    Cancelled,
}

impl SessionPhase {
    /// Stable lowercase name, as used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::AwaitingResponse => "awaiting_response",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed and Cancelled admit no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The prompt currently outstanding on the remote channel, if any.
#[derive(Debug, Clone, Copy)]
struct OutstandingPrompt {
    seq: u64,
    handle: PromptHandle,
}

/// State for a single authority request, keyed by cookie in the registry.
pub struct AuthenticationSession {
    cookie: Cookie,
    user_name: String,
    phase: SessionPhase,
    challenge: Box<dyn Challenge>,
    pending: PendingResult,
    done: CancellationToken,
    outstanding: Option<OutstandingPrompt>,
    instance: u64,
    torn_down: bool,
}

impl std::fmt::Debug for AuthenticationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationSession")
            .field("cookie", &self.cookie)
            .field("user_name", &self.user_name)
            .field("phase", &self.phase)
            .field("instance", &self.instance)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl AuthenticationSession {
    pub(crate) fn new(
        cookie: Cookie,
        identity: ResolvedIdentity,
        challenge: Box<dyn Challenge>,
        pending: PendingResult,
        done: CancellationToken,
        instance: u64,
    ) -> Self {
        Self {
            cookie,
            user_name: identity.user_name,
            phase: SessionPhase::Initiated,
            challenge,
            pending,
            done,
            outstanding: None,
            instance,
            torn_down: false,
        }
    }

    /// Authority cookie this session belongs to.
    #[must_use]
    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    /// Account name of the identity being reauthorized.
    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Distinguishes sessions that reuse a cookie; challenge events and
    /// cancellation notices carry the instance they were produced for, and
    /// the loop drops traffic whose instance no longer matches.
    pub(crate) const fn instance(&self) -> u64 {
        self.instance
    }

    pub(crate) const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub(crate) fn start_challenge(&mut self) {
        self.challenge.start();
    }

    /// Answers the challenge helper directly, without touching the phase.
    /// Used for echoed prompts, which never reach the remote side.
    pub(crate) fn respond_to_challenge(&mut self, answer: &str) {
        self.challenge.respond(answer);
    }

    /// Records a forwarded hidden prompt and moves to `AwaitingResponse`.
    pub(crate) fn begin_prompt(&mut self, seq: u64, handle: PromptHandle) {
        self.outstanding = Some(OutstandingPrompt { seq, handle });
        self.phase = SessionPhase::AwaitingResponse;
    }

    pub(crate) fn has_outstanding_prompt(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Clears the outstanding prompt and returns its channel handle. Called
    /// when the prompt must be retracted rather than answered.
    pub(crate) fn take_outstanding_prompt(&mut self) -> Option<PromptHandle> {
        self.outstanding.take().map(|prompt| prompt.handle)
    }

    /// Feeds a remote answer to the challenge helper.
    ///
    /// Only an answer matching the outstanding sequence number counts;
    /// anything else is a stale reply from a prompt that has since been
    /// retracted or superseded, and is dropped.
    pub(crate) fn handle_answer(&mut self, seq: u64, value: &str) {
        match self.outstanding {
            Some(outstanding) if outstanding.seq == seq => {
                self.outstanding = None;
                self.phase = SessionPhase::Initiated;
                self.challenge.respond(value);
            },
            _ => {
                debug!(cookie = %self.cookie, seq, "dropping stale prompt answer");
            },
        }
    }

    /// Delivers the challenge verdict to the caller, then tears down.
    ///
    /// The caller is resolved before any resource is released, so the
    /// verdict always wins over the `Cancelled` a teardown would report.
    pub(crate) fn complete(&mut self, bridge: &mut PromptBridge, gained_authorization: bool) {
        self.phase = SessionPhase::Completed;
        self.pending.resolve(Ok(gained_authorization));
        self.teardown(bridge, Ok(gained_authorization));
    }

    /// Releases everything this session holds, exactly once.
    ///
    /// Release order: cancellation subscription, challenge helper, caller
    /// resolution, outstanding prompt. `outcome` reaches the caller only if
    /// nothing resolved the session earlier. Safe to call repeatedly; later
    /// calls log and return.
    pub(crate) fn teardown(&mut self, bridge: &mut PromptBridge, outcome: AuthorizationOutcome) {
        if self.torn_down {
            debug!(cookie = %self.cookie, phase = %self.phase, "session already torn down");
            return;
        }
        self.torn_down = true;
        self.done.cancel();
        self.challenge.cancel();
        if !self.phase.is_terminal() {
            self.phase = SessionPhase::Cancelled;
        }
        if !self.pending.is_resolved() {
            self.pending.resolve(outcome);
        }
        bridge.retract(self);
    }
}
