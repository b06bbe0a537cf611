//! # Marquee Server
//!
//! Receives Plex `library.new` webhooks and manual update requests, queues a
//! label task for each, and runs the worker pool that looks up IMDb keywords
//! and writes them back to Plex as labels.
//!
//! The binary in `main.rs` wires configuration, logging and shutdown; this
//! library holds the router, handlers and application state so they can be
//! exercised in tests.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use routes::create_app;
