//! Parley - conversational agents wired through middleware
//!
//! This library provides agents that exchange typed messages, middleware
//! chains that observe and transform those exchanges, and an orchestrator
//! that drives a two-party chat until a stop signal or a turn limit.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod message;
pub mod middleware;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
