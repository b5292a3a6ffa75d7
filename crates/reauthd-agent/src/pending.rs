//! Exactly-once completion plumbing.
//!
//! Every authentication request is answered through a [`PendingResult`] /
//! [`PendingAuthorization`] pair. The broker side resolves the result at
//! most once; the authority side awaits it. If the broker disappears without
//! resolving, the waiting side still observes `Cancelled` rather than
//! hanging, so a caller can never be leaked.

use reauthd_core::authority::Cookie;
use reauthd_core::error::{AuthorizationError, AuthorizationOutcome};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Creates the completion pair for one request.
pub(crate) fn pending_pair(cookie: Cookie) -> (PendingResult, PendingAuthorization) {
    let (tx, rx) = oneshot::channel();
    (
        PendingResult {
            cookie,
            tx: Some(tx),
        },
        PendingAuthorization { rx },
    )
}

/// Broker-side handle that resolves a request exactly once.
#[derive(Debug)]
pub(crate) struct PendingResult {
    cookie: Cookie,
    tx: Option<oneshot::Sender<AuthorizationOutcome>>,
}

impl PendingResult {
    /// Delivers the outcome to the waiting caller.
    ///
    /// The first resolution wins. A second call is a logged no-op; reaching
    /// it means two teardown paths raced, which the torn-down guard should
    /// normally prevent.
    pub(crate) fn resolve(&mut self, outcome: AuthorizationOutcome) {
        match self.tx.take() {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(cookie = %self.cookie, "authorization waiter went away before resolution");
                }
            },
            None => {
                warn!(cookie = %self.cookie, "ignoring second resolution of an authentication result");
            },
        }
    }

    /// Returns true once an outcome has been delivered.
    pub(crate) const fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }
}

/// Caller-side future half of one authentication request.
///
/// Returned by `AuthenticationAgent::initiate`; await the outcome with
/// [`finish`](PendingAuthorization::finish).
#[derive(Debug)]
#[must_use = "the authority is waiting on this outcome"]
pub struct PendingAuthorization {
    rx: oneshot::Receiver<AuthorizationOutcome>,
}

impl PendingAuthorization {
    /// Waits for the resolution of this request.
    ///
    /// # Errors
    ///
    /// Returns whatever error resolved the session. If the broker vanished
    /// without resolving, returns [`AuthorizationError::Cancelled`].
    pub async fn finish(self) -> AuthorizationOutcome {
        self.rx.await.unwrap_or(Err(AuthorizationError::Cancelled))
    }
}
