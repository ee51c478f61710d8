//! Angry Lips
//!
//! Turn-based mad-lib sessions. A host creates a session from a generated
//! template, invites players and starts it; each blank becomes a turn with
//! a response window. Finished sessions are archived as vault entries that
//! can be summarized, retold by the AI co-host and published to the feed.
//!
//! - **template**: Template generator and prebuilt catalog
//! - **story**: Story assembly from filled turns
//! - **narrator**: AI co-host backends
//! - **model**: Sessions, turns, participants, vault entries
//! - **repository**: Session lifecycle over the store

pub mod model;
pub mod narrator;
mod repository;
pub mod story;
pub mod template;

pub use model::{
    Actor, CreatedSession, NewSession, Participant, PublishedEntry, Session, SessionDetail,
    SessionFilter, SessionStatus, TimeoutStrategy, Turn, TurnEvent, TurnStatus, VaultEntry,
    Visibility,
};
pub use narrator::{build_narrator, HttpNarrator, LocalNarrator, Narrator};
pub use repository::SessionRepository;
