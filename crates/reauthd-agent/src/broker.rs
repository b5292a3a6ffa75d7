//! The broker facade and its event loop.
//!
//! All mutable state lives in one task. The facade validates requests
//! synchronously, then hands them to the loop over an unbounded command
//! channel; challenge events, remote answers and cancellation notices
//! arrive on their own channels and are multiplexed with `tokio::select!`.
//! Nothing here takes a lock, so no event can observe a session mid-update.

use reauthd_core::authority::{AuthenticationRequest, Cookie, SUPPORTED_ACTION_ID};
use reauthd_core::challenge::{
    ChallengeEvent, ChallengeEventSender, ChallengeEventStream, ChallengeFactory,
    TaggedChallengeEvent,
};
use reauthd_core::config::AgentConfig;
use reauthd_core::error::AuthorizationError;
use reauthd_core::identity::{self, ResolvedIdentity};
use reauthd_core::prompt::{PromptAnswer, PromptAnswerStream, PromptChannel};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::PromptBridge;
use crate::pending::{pending_pair, PendingAuthorization, PendingResult};
use crate::registry::SessionRegistry;
use crate::session::AuthenticationSession;

/// What the facade asks of the loop.
#[derive(Debug)]
enum Command {
    Initiate {
        cookie: Cookie,
        identity: ResolvedIdentity,
        cancellation: CancellationToken,
        pending: PendingResult,
    },
    ActiveSessions {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// A fired authority cancellation, relayed by a per-session watcher task.
///
/// Carries the session instance it was armed for so that a notice queued
/// behind a cookie reuse cannot cancel the successor session.
#[derive(Debug)]
struct CancellationNotice {
    cookie: Cookie,
    instance: u64,
}

/// Cloneable handle to a running authentication agent.
///
/// Dropping every handle closes the command channel, which the loop treats
/// as shutdown: all live sessions resolve as `Cancelled`.
#[derive(Debug, Clone)]
pub struct AuthenticationAgent {
    commands: mpsc::UnboundedSender<Command>,
    caller_uid: u32,
}

impl AuthenticationAgent {
    /// Spawns the broker loop and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(
        config: AgentConfig,
        factory: Box<dyn ChallengeFactory>,
        channel: Box<dyn PromptChannel>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (challenge_tx, challenge_events) = mpsc::unbounded_channel();
        let (answers_tx, answers) = mpsc::unbounded_channel();
        let (cancellations_tx, cancellations) = mpsc::unbounded_channel();
        let broker = BrokerLoop {
            registry: SessionRegistry::new(config.max_sessions),
            bridge: PromptBridge::new(channel, answers_tx),
            factory,
            commands: commands_rx,
            challenge_tx,
            challenge_events,
            answers,
            cancellations_tx,
            cancellations,
            next_instance: 0,
        };
        tokio::spawn(broker.run());
        Self {
            commands: commands_tx,
            caller_uid: nix::unistd::getuid().as_raw(),
        }
    }

    /// Accepts one authority request and returns its pending outcome.
    ///
    /// Action and identity checks happen here, before any session state is
    /// created: a request for a foreign action or without exactly one
    /// identity matching the local uid resolves immediately. Valid requests
    /// are handed to the loop, which runs a challenge helper for them.
    pub fn initiate(&self, request: AuthenticationRequest) -> PendingAuthorization {
        let AuthenticationRequest {
            action_id,
            message,
            identities,
            cookie,
            cancellation,
        } = request;
        debug!(cookie = %cookie, action = %action_id, message = %message, "authority requested authentication");
        let (mut pending, authorization) = pending_pair(cookie.clone());
        if action_id != SUPPORTED_ACTION_ID {
            debug!(cookie = %cookie, action = %action_id, "rejecting unsupported action");
            pending.resolve(Err(AuthorizationError::unsupported_action(action_id)));
            return authorization;
        }
        match identity::select(&identities, self.caller_uid) {
            Ok(identity) => {
                let command = Command::Initiate {
                    cookie,
                    identity,
                    cancellation,
                    pending,
                };
                if let Err(SendError(command)) = self.commands.send(command) {
                    if let Command::Initiate {
                        pending: mut orphaned,
                        ..
                    } = command
                    {
                        debug!("agent loop is gone; cancelling the request");
                        orphaned.resolve(Err(AuthorizationError::Cancelled));
                    }
                }
            },
            Err(err) => {
                warn!(cookie = %cookie, "{err}");
                pending.resolve(Err(err));
            },
        }
        authorization
    }

    /// Number of sessions currently linked in the registry. Zero once the
    /// loop has stopped.
    pub async fn active_sessions(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::ActiveSessions { reply: reply_tx })
            .is_err()
        {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Stops the loop after cancelling every live session. Waiting callers
    /// observe `Cancelled`. Returns once the loop has acknowledged.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done: done_tx }).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

/// Single owner of the registry, the bridge and the challenge factory.
struct BrokerLoop {
    registry: SessionRegistry,
    bridge: PromptBridge,
    factory: Box<dyn ChallengeFactory>,
    commands: mpsc::UnboundedReceiver<Command>,
    challenge_tx: mpsc::UnboundedSender<TaggedChallengeEvent>,
    challenge_events: ChallengeEventStream,
    answers: PromptAnswerStream,
    cancellations_tx: mpsc::UnboundedSender<CancellationNotice>,
    cancellations: mpsc::UnboundedReceiver<CancellationNotice>,
    next_instance: u64,
}

impl BrokerLoop {
    // The event channels never yield `None` here: the loop keeps a sender
    // for each of them, so only the command arm can end the loop.
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Initiate { cookie, identity, cancellation, pending }) => {
                        self.handle_initiate(cookie, identity, cancellation, pending);
                    },
                    Some(Command::ActiveSessions { reply }) => {
                        let _ = reply.send(self.registry.len());
                    },
                    Some(Command::Shutdown { done }) => {
                        debug!("shutting down authentication agent");
                        self.shutdown_sessions();
                        let _ = done.send(());
                        break;
                    },
                    None => {
                        debug!("all agent handles dropped; shutting down");
                        self.shutdown_sessions();
                        break;
                    },
                },
                Some((cookie, instance, event)) = self.challenge_events.recv() => {
                    self.handle_challenge_event(cookie, instance, event);
                },
                Some(answer) = self.answers.recv() => {
                    self.handle_answer(answer);
                },
                Some(notice) = self.cancellations.recv() => {
                    self.handle_cancellation(notice);
                },
            }
        }
    }

    fn handle_initiate(
        &mut self,
        cookie: Cookie,
        identity: ResolvedIdentity,
        cancellation: CancellationToken,
        pending: PendingResult,
    ) {
        self.next_instance += 1;
        let instance = self.next_instance;
        let done = CancellationToken::new();
        self.spawn_cancellation_watcher(cookie.clone(), instance, cancellation, done.clone());

        let events =
            ChallengeEventSender::bind(cookie.clone(), instance, self.challenge_tx.clone());
        let challenge = self.factory.open(&identity, &cookie, events);
        let mut session =
            AuthenticationSession::new(cookie.clone(), identity, challenge, pending, done, instance);
        debug!(cookie = %cookie, user = %session.user_name(), "challenge helper starting");
        session.start_challenge();

        let displaced = self.registry.put(session);
        if let Some(mut replaced) = displaced.replaced {
            debug!(cookie = %cookie, "superseding session under a reused cookie");
            replaced.teardown(&mut self.bridge, Err(AuthorizationError::Cancelled));
        }
        for mut evicted in displaced.evicted {
            warn!(cookie = %evicted.cookie(), "session capacity reached; cancelling the oldest session");
            evicted.teardown(&mut self.bridge, Err(AuthorizationError::Cancelled));
        }
    }

    /// Watches one authority cancellation token. The `done` token ends the
    /// watch when the session goes away for any other reason.
    fn spawn_cancellation_watcher(
        &self,
        cookie: Cookie,
        instance: u64,
        cancellation: CancellationToken,
        done: CancellationToken,
    ) {
        let notify = self.cancellations_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancellation.cancelled() => {
                    let _ = notify.send(CancellationNotice { cookie, instance });
                },
                () = done.cancelled() => {},
            }
        });
    }

    /// Dispatches one event from the shared challenge stream.
    ///
    /// Events are attributed by cookie and registration instance. A mismatch
    /// means the event came from a challenge whose session is gone, such as
    /// a helper still draining after its cookie was reused; its traffic must
    /// never reach the successor session.
    fn handle_challenge_event(&mut self, cookie: Cookie, instance: u64, event: ChallengeEvent) {
        match self.registry.instance_of(&cookie) {
            Some(live) if live == instance => {},
            Some(_) => {
                debug!(cookie = %cookie, "dropping challenge event from a superseded session");
                return;
            },
            None => {
                debug!(cookie = %cookie, "challenge event for unknown session");
                return;
            },
        }
        match event {
            ChallengeEvent::Request { text, echo_visible } => {
                self.handle_prompt_request(&cookie, &text, echo_visible);
            },
            ChallengeEvent::ShowInfo(text) => {
                info!(cookie = %cookie, "challenge helper info: {text}");
            },
            ChallengeEvent::ShowError(text) => {
                warn!(cookie = %cookie, "challenge helper error: {text}");
            },
            ChallengeEvent::Completed {
                gained_authorization,
            } => {
                self.handle_completed(&cookie, gained_authorization);
            },
        }
    }

    fn handle_prompt_request(&mut self, cookie: &Cookie, text: &str, echo_visible: bool) {
        let Some(session) = self.registry.get_mut(cookie) else {
            debug!(cookie = %cookie, "prompt request for unknown session");
            return;
        };
        if let Err(err) = self.bridge.forward_prompt(session, text, echo_visible) {
            warn!(cookie = %cookie, %err, "remote prompt channel failed; cancelling session");
            let outcome = Err(AuthorizationError::prompt_channel_unavailable(err.to_string()));
            self.registry
                .remove_and_teardown(cookie, &mut self.bridge, outcome);
        }
    }

    fn handle_answer(&mut self, answer: PromptAnswer) {
        match self.registry.get_mut(&answer.cookie) {
            Some(session) => session.handle_answer(answer.seq, &answer.value),
            None => debug!(cookie = %answer.cookie, "answer for unknown session"),
        }
    }

    /// The session is unlinked before the verdict is delivered, so nothing
    /// reached through the registry can observe a half-completed session.
    fn handle_completed(&mut self, cookie: &Cookie, gained_authorization: bool) {
        debug!(cookie = %cookie, gained = gained_authorization, "challenge completed");
        if let Some(mut session) = self.registry.remove(cookie) {
            session.complete(&mut self.bridge, gained_authorization);
        }
    }

    fn handle_cancellation(&mut self, notice: CancellationNotice) {
        let CancellationNotice { cookie, instance } = notice;
        match self.registry.instance_of(&cookie) {
            Some(live) if live == instance => {
                debug!(cookie = %cookie, "cancelled agent authentication");
                self.registry.remove_and_teardown(
                    &cookie,
                    &mut self.bridge,
                    Err(AuthorizationError::Cancelled),
                );
            },
            Some(_) => debug!(cookie = %cookie, "cancellation notice for a superseded session"),
            None => debug!(cookie = %cookie, "cancellation notice for unknown session"),
        }
    }

    fn shutdown_sessions(&mut self) {
        let sessions = self.registry.drain();
        if !sessions.is_empty() {
            debug!(count = sessions.len(), "cancelling remaining sessions");
        }
        for mut session in sessions {
            session.teardown(&mut self.bridge, Err(AuthorizationError::Cancelled));
        }
    }
}
