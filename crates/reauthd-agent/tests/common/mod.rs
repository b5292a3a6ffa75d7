//! Recording doubles and helpers shared by the agent integration tests.
//!
//! The mocks stand in for the three capability seams: the challenge
//! factory (what the authority's helper would do), the prompt channel
//! (what the remote client would do) and the authority itself. Each
//! records every call into shared state the tests assert on, and tests
//! drive challenge events and prompt answers by hand.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reauthd_agent::AuthenticationAgent;
use reauthd_core::authority::{
    AuthenticationRequest, Authority, AuthorityError, Cookie, RegistrationHandle, SessionSubject,
    SUPPORTED_ACTION_ID,
};
use reauthd_core::challenge::{Challenge, ChallengeEvent, ChallengeEventSender, ChallengeFactory};
use reauthd_core::config::AgentConfig;
use reauthd_core::identity::{CandidateIdentity, ResolvedIdentity};
use reauthd_core::prompt::{
    PromptChannel, PromptChannelError, PromptHandle, PromptReply, PromptRequest,
};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Challenge side
// =============================================================================

/// Everything the mock challenges have been asked to do, plus the event
/// senders needed to play the helper's side of each conversation. Senders
/// are kept in open order, one per challenge, so a test can also speak as
/// a helper whose session is already gone.
#[derive(Default)]
pub struct ChallengeLog {
    pub opened: Vec<Cookie>,
    pub started: Vec<Cookie>,
    pub responses: Vec<(Cookie, String)>,
    pub cancelled: Vec<Cookie>,
    senders: Vec<(Cookie, ChallengeEventSender)>,
}

impl ChallengeLog {
    /// Emits one challenge event for `cookie`, as the live helper would.
    pub fn emit(&self, cookie: &Cookie, event: ChallengeEvent) {
        let (_, sender) = self
            .senders
            .iter()
            .rev()
            .find(|(held, _)| held == cookie)
            .expect("no challenge opened for this cookie");
        sender.send(event);
    }

    /// Emits an event through the first challenge opened for `cookie`,
    /// playing a helper that kept talking after its cookie was reused.
    pub fn emit_from_predecessor(&self, cookie: &Cookie, event: ChallengeEvent) {
        let (_, sender) = self
            .senders
            .iter()
            .find(|(held, _)| held == cookie)
            .expect("no challenge opened for this cookie");
        sender.send(event);
    }
}

pub type SharedChallengeLog = Arc<Mutex<ChallengeLog>>;

pub struct MockChallengeFactory {
    log: SharedChallengeLog,
}

impl ChallengeFactory for MockChallengeFactory {
    fn open(
        &self,
        _identity: &ResolvedIdentity,
        cookie: &Cookie,
        events: ChallengeEventSender,
    ) -> Box<dyn Challenge> {
        let mut log = self.log.lock().unwrap();
        log.opened.push(cookie.clone());
        log.senders.push((cookie.clone(), events));
        Box::new(MockChallenge {
            cookie: cookie.clone(),
            log: Arc::clone(&self.log),
        })
    }
}

struct MockChallenge {
    cookie: Cookie,
    log: SharedChallengeLog,
}

impl Challenge for MockChallenge {
    fn start(&mut self) {
        self.log.lock().unwrap().started.push(self.cookie.clone());
    }

    fn respond(&mut self, answer: &str) {
        self.log
            .lock()
            .unwrap()
            .responses
            .push((self.cookie.clone(), answer.to_string()));
    }

    fn cancel(&mut self) {
        self.log.lock().unwrap().cancelled.push(self.cookie.clone());
    }
}

// =============================================================================
// Prompt side
// =============================================================================

/// One prompt the remote client was shown.
pub struct PromptRecord {
    pub handle: u64,
    pub user: String,
    pub text: String,
}

/// Everything the mock prompt channel has seen. Reply handles stay here
/// until a test answers through them.
#[derive(Default)]
pub struct PromptLog {
    pub requests: Vec<PromptRecord>,
    pub cancelled: Vec<u64>,
    pub replies: Vec<PromptReply>,
    pub fail_next: Option<PromptChannelError>,
    next_id: u64,
}

pub type SharedPromptLog = Arc<Mutex<PromptLog>>;

pub struct MockPromptChannel {
    log: SharedPromptLog,
}

impl PromptChannel for MockPromptChannel {
    fn request_prompt(&mut self, request: PromptRequest) -> Result<PromptHandle, PromptChannelError> {
        let mut log = self.log.lock().unwrap();
        if let Some(err) = log.fail_next.take() {
            return Err(err);
        }
        log.next_id += 1;
        let id = log.next_id;
        log.requests.push(PromptRecord {
            handle: id,
            user: request.user,
            text: request.text,
        });
        log.replies.push(request.reply);
        Ok(PromptHandle::new(id))
    }

    fn cancel_prompt(&mut self, handle: PromptHandle) {
        self.log.lock().unwrap().cancelled.push(handle.id());
    }
}

/// Answers the most recent unanswered prompt, as the remote client would.
pub fn answer_last_prompt(prompts: &SharedPromptLog, value: &str) {
    let reply = prompts
        .lock()
        .unwrap()
        .replies
        .pop()
        .expect("a prompt is outstanding");
    reply.answer(Some(value.to_string()));
}

// =============================================================================
// Authority side
// =============================================================================

#[derive(Default)]
pub struct AuthorityLog {
    pub registered: Vec<SessionSubject>,
    pub released: Vec<u64>,
    pub fail_with: Option<AuthorityError>,
}

pub type SharedAuthorityLog = Arc<Mutex<AuthorityLog>>;

pub struct MockAuthority {
    log: SharedAuthorityLog,
    next_id: u64,
}

impl MockAuthority {
    pub fn new() -> (Self, SharedAuthorityLog) {
        let log = Arc::new(Mutex::new(AuthorityLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                next_id: 0,
            },
            log,
        )
    }
}

impl Authority for MockAuthority {
    fn register_agent(
        &mut self,
        subject: &SessionSubject,
    ) -> Result<RegistrationHandle, AuthorityError> {
        let mut log = self.log.lock().unwrap();
        if let Some(err) = log.fail_with.take() {
            return Err(err);
        }
        log.registered.push(*subject);
        self.next_id += 1;
        Ok(RegistrationHandle::new(self.next_id))
    }

    fn unregister_agent(&mut self, handle: RegistrationHandle) {
        self.log.lock().unwrap().released.push(handle.id());
    }
}

// =============================================================================
// Agent and request construction
// =============================================================================

/// Starts an agent wired to fresh mocks.
pub fn start_agent(max_sessions: usize) -> (AuthenticationAgent, SharedChallengeLog, SharedPromptLog) {
    let challenges = Arc::new(Mutex::new(ChallengeLog::default()));
    let prompts = Arc::new(Mutex::new(PromptLog::default()));
    let agent = AuthenticationAgent::start(
        AgentConfig { max_sessions },
        Box::new(MockChallengeFactory {
            log: Arc::clone(&challenges),
        }),
        Box::new(MockPromptChannel {
            log: Arc::clone(&prompts),
        }),
    );
    (agent, challenges, prompts)
}

/// Uid of the test process; the only uid the agent will match.
pub fn caller_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

/// A well-formed request for `cookie`, answerable by the test process.
pub fn request(cookie: &str) -> AuthenticationRequest {
    request_with(cookie, CancellationToken::new())
}

pub fn request_with(cookie: &str, cancellation: CancellationToken) -> AuthenticationRequest {
    AuthenticationRequest {
        action_id: SUPPORTED_ACTION_ID.to_string(),
        message: "Authentication is required to update system software".to_string(),
        identities: vec![CandidateIdentity::unix_user(caller_uid(), "alice")],
        cookie: Cookie::new(cookie),
        cancellation,
    }
}

// =============================================================================
// Synchronization
// =============================================================================

/// Polls `condition` until it holds, or panics after two seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let satisfied = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), satisfied)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Gives queued loop work a chance to run before asserting on absence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
