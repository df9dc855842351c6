//! LSP wire-level plumbing: URIs, the client capability set sent during
//! `initialize`, and the full-duplex client that talks to one server child.

pub mod capabilities;
pub mod client;
pub mod uri;

pub use client::LspClient;
