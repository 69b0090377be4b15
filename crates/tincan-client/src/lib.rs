//! Client toolkit for the tincan sync protocol.
//!
//! `rest` talks to the HTTP surface, `socket` holds the live gateway
//! connection, and the remaining modules are the pure state containers a UI
//! renders from: `chat_view` reconciles one open chat, `unseen` derives badge
//! counts, `presence` tracks who is online. The state containers never touch
//! the network themselves; the embedding layer wires fetches and events
//! through them.

pub mod chat_view;
pub mod error;
pub mod presence;
pub mod rest;
pub mod socket;
pub mod unseen;

pub use error::ClientError;
