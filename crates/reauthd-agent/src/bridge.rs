//! Relay between challenge helpers and the remote prompt channel.
//!
//! The bridge enforces the two prompt rules: echoed prompts never leave the
//! process (they are answered locally with an empty string, mirroring what a
//! terminal would show anyway), and at most one hidden prompt per session is
//! outstanding on the remote side at any time.

use reauthd_core::prompt::{
    PromptAnswerSender, PromptChannel, PromptChannelError, PromptReply, PromptRequest,
};
use tracing::{debug, info, warn};

use crate::session::AuthenticationSession;

/// Forwards hidden prompts to the remote channel and retracts them on
/// teardown. Owned by the broker loop alongside the session registry.
pub struct PromptBridge {
    channel: Box<dyn PromptChannel>,
    answers: PromptAnswerSender,
    /// Next prompt sequence number. Bridge-wide, so no two prompts ever
    /// share a number, not even across sessions reusing a cookie.
    next_seq: u64,
}

impl PromptBridge {
    pub(crate) fn new(channel: Box<dyn PromptChannel>, answers: PromptAnswerSender) -> Self {
        Self {
            channel,
            answers,
            next_seq: 0,
        }
    }

    /// Routes one challenge prompt.
    ///
    /// Echoed prompts are answered with `""` immediately and never surfaced.
    /// Hidden prompts go out on the channel tagged with a sequence number
    /// from the bridge-wide counter, so an answer to a retracted or
    /// superseded prompt can never match a live one; a prior outstanding
    /// prompt is retracted first.
    ///
    /// # Errors
    ///
    /// Propagates the channel error when the remote side rejects the prompt
    /// or has gone away. The session is left without an outstanding prompt;
    /// the caller decides whether that ends the session.
    pub(crate) fn forward_prompt(
        &mut self,
        session: &mut AuthenticationSession,
        text: &str,
        echo_visible: bool,
    ) -> Result<(), PromptChannelError> {
        if echo_visible {
            info!(cookie = %session.cookie(), "ignoring echoed prompt request: {text}");
            session.respond_to_challenge("");
            return Ok(());
        }
        if session.has_outstanding_prompt() {
            warn!(cookie = %session.cookie(), "challenge raised a second prompt; retracting the first");
            self.retract(session);
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        let reply = PromptReply::new(session.cookie().clone(), seq, self.answers.clone());
        let request = PromptRequest {
            user: session.user_name().to_string(),
            text: text.to_string(),
            reply,
        };
        let handle = self.channel.request_prompt(request)?;
        session.begin_prompt(seq, handle);
        Ok(())
    }

    /// Withdraws the session's outstanding prompt, if one exists.
    /// Idempotent: the handle is taken out of the session first.
    pub(crate) fn retract(&mut self, session: &mut AuthenticationSession) {
        if let Some(handle) = session.take_outstanding_prompt() {
            debug!(cookie = %session.cookie(), handle = handle.id(), "retracting outstanding prompt");
            self.channel.cancel_prompt(handle);
        }
    }
}
