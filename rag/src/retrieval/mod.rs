//! Dual-source retrieval and fusion.
//!
//! - [`GraphRetriever`]: entity-seeded traversal of the recipe graph
//! - [`VectorRetriever`]: embedding + nearest-neighbour search
//! - [`ResultFuser`]: per-source normalization, merge and ranking
//!
//! Every external call goes through a [`ServiceGate`] (bounded concurrency and
//! a per-call timeout) wrapped in [`with_retry`].

mod fusion;
mod graph;
mod resilience;
pub(crate) mod vector;

pub use fusion::ResultFuser;
pub use graph::GraphRetriever;
pub use resilience::{ServiceGate, with_retry};
pub use vector::VectorRetriever;
