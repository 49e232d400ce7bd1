//! Concrete store implementations.

pub mod dgraph;

pub use dgraph::DgraphStore;
