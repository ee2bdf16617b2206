//! devstack: local Docker services dashboard backend.
//!
//! Aggregates container state into logical services and relays live
//! container and stats updates to dashboard clients over WebSocket.

pub mod api;
pub mod catalog;
pub mod container;
pub mod status;
pub mod ws;
