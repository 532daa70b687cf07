use crate::{Error, Result};

use std::fmt;

/**
 * Lifecycle of a vertex program inside one job.
 *
 * UNINITIALIZED ---> SETUP ---> EXECUTING ---> TERMINATED
 *                                 ^     |
 *                                 |     |
 *                                  -----
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Uninitialized, // the job was submitted, nothing ran yet.
    Setup,         // setup ran; memory holds initial values.
    Executing,     // at least one superstep is running or done.
    Terminated,    // the termination predicate held; no more supersteps.
}

impl ProgramState {
    pub fn transition(self, next: ProgramState) -> Result<ProgramState> {
        use ProgramState::*;

        match (self, next) {
            (Uninitialized, Setup) | (Setup, Executing) | (Executing, Executing) | (Executing, Terminated) => {
                Ok(next)
            }
            _ => Err(Error::configuration(format!(
                "illegal program state transition {} -> {}",
                self, next
            ))),
        }
    }
}

impl fmt::Display for ProgramState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgramState::Uninitialized => "UNINITIALIZED",
            ProgramState::Setup => "SETUP",
            ProgramState::Executing => "EXECUTING",
            ProgramState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
