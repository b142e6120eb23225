//! Memory Reader Abstraction
//!
//! The capability the dump pipeline consumes, plus its bindings:
//! - Live local process via `ProcessReader`
//! - Remote instrumentation agent over TCP via `AgentReader`
//! - Mock reader for testing

mod agent;
#[cfg(test)]
mod mock;
mod process;
mod traits;

pub use agent::AgentReader;
pub use process::{find_process, parse_maps, ProcessReader};
pub use traits::MemoryReader;

#[cfg(test)]
pub mod tests {
    pub use super::mock::MockReader;
}
