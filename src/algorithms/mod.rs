//! Ready-made programs and passes.

mod cluster_count;
pub use cluster_count::*;

mod cluster_population;
pub use cluster_population::*;

mod page_rank;
pub use page_rank::*;

mod peer_pressure;
pub use peer_pressure::*;
