//! Core domain: routing, transport dispatch, and the request coordinator
//! that ties them together.

pub mod coordinator;
pub mod moderation;
pub mod router;
pub mod transport;
pub mod usage;
