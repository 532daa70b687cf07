//! A bulk synchronous parallel graph computer.
//!
//! A [`GraphComputer`] reads a graph through a [`Storage`], runs a
//! [`VertexProgram`] over it superstep by superstep, applies
//! [`MapReduce`] passes to the final graph and publishes the resulting graph
//! and [`Memory`] under an output location in one step.

mod channel;
mod master;
mod message;
mod worker;

pub mod algorithms;
pub mod codec;
pub use codec::{GraphFormat, MemoryFormat};

mod combine;
pub use combine::*;

mod computer;
pub use computer::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod graph;
pub use graph::*;

mod location;
pub use location::*;

mod mapreduce;
pub use mapreduce::*;

mod memory;
pub use memory::*;

mod partition;
pub use partition::*;

mod program;
pub use program::*;

mod record;
pub use record::*;

mod result;
pub use result::*;

mod state;
pub use state::*;

mod storage;
pub use storage::*;

mod value;
pub use value::*;

mod vertex;
pub use vertex::*;
