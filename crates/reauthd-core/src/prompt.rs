//! Remote prompt channel capability.
//!
//! Hidden challenge requests are relayed to a remote interactive client over
//! a wire protocol this crate never sees. The channel accepts a prompt and
//! a [`PromptReply`]; whenever the remote answer arrives, the reply routes
//! it back to the broker loop tagged with the owning cookie and the prompt
//! sequence number, so stale answers can be told apart from live ones.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::authority::Cookie;

/// Identifies one outstanding remote prompt.
///
/// Opaque to the agent; the channel uses it to retract a prompt that is no
/// longer wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptHandle(u64);

impl PromptHandle {
    /// Create a handle with a channel-chosen id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the channel-chosen id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// An answer returning from the remote client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAnswer {
    /// Session the answer belongs to.
    pub cookie: Cookie,
    /// Sequence number of the prompt being answered.
    pub seq: u64,
    /// Answer text; empty when the client sent none.
    pub value: String,
}

/// Sender half of the answer path back into the broker loop.
pub type PromptAnswerSender = mpsc::UnboundedSender<PromptAnswer>;

/// Receiver half of the answer path.
pub type PromptAnswerStream = mpsc::UnboundedReceiver<PromptAnswer>;

/// Consuming reply callback for one prompt.
///
/// Consuming `self` makes answering twice unrepresentable for well-behaved
/// channels; the broker additionally drops answers whose sequence number no
/// longer matches, so teardown races stay harmless.
#[derive(Debug)]
pub struct PromptReply {
    cookie: Cookie,
    seq: u64,
    tx: PromptAnswerSender,
}

impl PromptReply {
    /// Bind a reply to its session and prompt sequence number.
    #[must_use]
    pub fn new(cookie: Cookie, seq: u64, tx: PromptAnswerSender) -> Self {
        Self { cookie, seq, tx }
    }

    /// Returns the owning session's cookie.
    #[must_use]
    pub const fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    /// Returns the prompt sequence number this reply answers.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Routes the remote answer back to the broker.
    ///
    /// A missing value collapses to the empty string. An answer arriving
    /// after the broker exited is dropped with a log line.
    pub fn answer(self, value: Option<String>) {
        let answer = PromptAnswer {
            cookie: self.cookie,
            seq: self.seq,
            value: value.unwrap_or_default(),
        };
        if self.tx.send(answer).is_err() {
            debug!("dropping remote answer: broker is gone");
        }
    }
}

/// One prompt to surface on the remote client.
#[derive(Debug)]
pub struct PromptRequest {
    /// Account name the answer is asked of.
    pub user: String,
    /// Prompt text from the challenge.
    pub text: String,
    /// Reply used to deliver the answer.
    pub reply: PromptReply,
}

/// Errors the prompt channel can raise when asked to surface a prompt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptChannelError {
    /// The transport to the remote client is gone.
    #[error("prompt channel closed: {reason}")]
    Closed {
        /// Description of the close.
        reason: String,
    },

    /// The channel refused this prompt.
    #[error("prompt rejected: {reason}")]
    Rejected {
        /// Description of the refusal.
        reason: String,
    },
}

impl PromptChannelError {
    /// Create a closed error.
    #[must_use]
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Create a rejected error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Remote surface prompts are relayed through.
///
/// The agent holds at most one outstanding prompt per session and retracts
/// it with [`cancel_prompt`](PromptChannel::cancel_prompt) whenever the
/// session ends first.
pub trait PromptChannel: Send {
    /// Surfaces a prompt on the remote client.
    ///
    /// # Errors
    ///
    /// Returns a [`PromptChannelError`] when the prompt cannot be delivered;
    /// the agent treats that as cancellation of the affected session only.
    fn request_prompt(&mut self, request: PromptRequest) -> Result<PromptHandle, PromptChannelError>;

    /// Retracts an outstanding prompt.
    ///
    /// Called exactly once per undelivered prompt; answering and retraction
    /// may race, which the broker tolerates.
    fn cancel_prompt(&mut self, handle: PromptHandle);
}
