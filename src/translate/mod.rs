//! Wire-format translation between the client-facing chat-completions
//! API and the upstream chat backend.
//!
//! Request translation and frame building are pure (no I/O); the relay
//! drives them from the streaming loop.

pub mod openai_types;
pub mod request;
pub mod response;
pub mod upstream_types;
