//! Unattended multi-account agent for the Sleepagotchi constellation game.

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod egress;
pub mod error;
pub mod pacing;
pub mod planner;
pub mod store;

pub use agent::{AgentDeps, run_agent};
pub use error::AgentError;
