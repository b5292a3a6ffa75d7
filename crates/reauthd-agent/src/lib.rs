//! reauthd-agent - Authentication-session broker between a privilege
//! authority and a remote prompt channel.
//!
//! The agent accepts authentication requests from an authority, runs one
//! challenge helper per request, and relays hidden prompts to a remote
//! interactive client. Echoed prompts are answered locally and never leave
//! the process. Every request resolves exactly once: with the challenge
//! verdict, or as cancelled when the authority, the channel or the broker
//! gives up first.
//!
//! All session state is owned by a single event-loop task; the
//! [`AuthenticationAgent`] handle talks to it over channels, so there are
//! no locks and no event can observe a session mid-update.
//!
//! # Modules
//!
//! - `broker`: facade handle and the event loop that owns all state
//! - `session`: per-request state machine and its teardown order
//! - `registry`: bounded cookie-to-session store
//! - `bridge`: prompt relay to the remote channel
//! - `pending`: exactly-once completion pair
//! - `registration`: best-effort authority registration

pub mod bridge;
pub mod broker;
pub mod pending;
pub mod registration;
pub mod registry;
pub mod session;

// Re-export the facade surface. Sessions and the registry are only ever
// obtained inside the broker loop.
pub use broker::AuthenticationAgent;
pub use pending::PendingAuthorization;
pub use registration::{try_register, RegisteredAgent};
