//! Interactive challenge capability.
//!
//! A challenge is the authority's opaque multi-step exchange: it asks
//! questions, the identity answers, and eventually the authority reports
//! whether authorization was gained. The agent never interprets the steps;
//! it opens a challenge, relays prompts and answers, and listens for events.
//!
//! Challenge implementations report everything as events, including their
//! own failures: a helper that cannot start emits
//! `Completed { gained_authorization: false }` rather than an error. After
//! [`Challenge::cancel`] the broker stops listening; a final `Completed`
//! event may still be emitted and is dropped.

use tokio::sync::mpsc;
use tracing::debug;

use crate::authority::Cookie;
use crate::identity::ResolvedIdentity;

/// One interactive step or outcome reported by a running challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// The challenge wants an answer to `text`.
    Request {
        /// Prompt text, e.g. "Password: ".
        text: String,
        /// True when the answer would be echoed on a terminal.
        ///
        /// Echoed requests carry no secret and are answered empty by the
        /// agent itself, never surfaced remotely.
        echo_visible: bool,
    },

    /// Informational line; logged, never surfaced as a prompt.
    ShowInfo(String),

    /// Error line; logged, never surfaced as a prompt.
    ShowError(String),

    /// Terminal verdict for this challenge.
    Completed {
        /// Whether the identity gained authorization.
        gained_authorization: bool,
    },
}

/// One challenge event on the shared stream, attributed to the session that
/// produced it by cookie and registration instance.
pub type TaggedChallengeEvent = (Cookie, u64, ChallengeEvent);

/// Receiver half of the shared challenge event stream.
pub type ChallengeEventStream = mpsc::UnboundedReceiver<TaggedChallengeEvent>;

/// Sender half of the shared challenge event stream, bound to one session.
///
/// Events from every running challenge are multiplexed onto one stream. The
/// broker binds one sender per opened challenge, and every event it sends is
/// tagged with that session's cookie and registration instance, so events
/// from a challenge that outlived a reused cookie can be told apart from the
/// successor's.
#[derive(Debug, Clone)]
pub struct ChallengeEventSender {
    cookie: Cookie,
    instance: u64,
    tx: mpsc::UnboundedSender<TaggedChallengeEvent>,
}

impl ChallengeEventSender {
    /// Binds a sender to the session identified by `cookie` and `instance`.
    #[must_use]
    pub fn bind(
        cookie: Cookie,
        instance: u64,
        tx: mpsc::UnboundedSender<TaggedChallengeEvent>,
    ) -> Self {
        Self {
            cookie,
            instance,
            tx,
        }
    }

    /// Sends one event from this session's challenge.
    ///
    /// An event sent after the broker exited is dropped with a log line.
    pub fn send(&self, event: ChallengeEvent) {
        if self
            .tx
            .send((self.cookie.clone(), self.instance, event))
            .is_err()
        {
            debug!(cookie = %self.cookie, "dropping challenge event: broker is gone");
        }
    }
}

/// A single running interactive challenge.
pub trait Challenge: Send {
    /// Begins the exchange; all progress arrives as events.
    fn start(&mut self);

    /// Supplies the answer to the most recent `Request` event.
    fn respond(&mut self, answer: &str);

    /// Abandons the exchange.
    ///
    /// Idempotent; called at most once by the agent, during teardown.
    fn cancel(&mut self);
}

/// Opens challenges on behalf of a resolved identity.
pub trait ChallengeFactory: Send {
    /// Creates the challenge for `identity` under `cookie`.
    ///
    /// Infallible: implementations that cannot set up the exchange return a
    /// challenge whose `start` emits a failed `Completed` event.
    fn open(
        &self,
        identity: &ResolvedIdentity,
        cookie: &Cookie,
        events: ChallengeEventSender,
    ) -> Box<dyn Challenge>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_sender_tags_every_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ChallengeEventSender::bind(Cookie::new("c1"), 7, tx);

        sender.send(ChallengeEvent::ShowInfo("retry".to_string()));

        let (cookie, instance, event) = rx.try_recv().unwrap();
        assert_eq!(cookie, Cookie::new("c1"));
        assert_eq!(instance, 7);
        assert_eq!(event, ChallengeEvent::ShowInfo("retry".to_string()));
    }

    #[test]
    fn test_send_after_broker_exit_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ChallengeEventSender::bind(Cookie::new("c1"), 1, tx);
        drop(rx);

        // Must not panic; the challenge cannot do anything about a gone
        // broker.
        sender.send(ChallengeEvent::Completed {
            gained_authorization: false,
        });
    }
}
