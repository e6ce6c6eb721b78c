//! Per-account agent.
//!
//! Each account runs as its own task: it authenticates once, then loops
//! through poll cycles and sleeps until it fails fatally or the process
//! shuts down.

mod cycle;
mod runner;
mod state;

pub use cycle::{CycleContext, CycleMemory, CycleReport, run_cycle};
pub use runner::{AgentDeps, run_agent};
pub use state::{AgentEvent, AgentState, PROXY_WAIT, TransitionError, transition};
