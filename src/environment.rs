//! Core environment.
//!
//! This module defines the dependency bundle handed to every engine:
//! the graph store, the message dispatcher, the clock, and the
//! configuration. One environment per process; construction is the
//! only place dependencies are wired.

use crate::config::CoreConfig;
use crate::providers::{Clock, GraphStore, MessageDispatcher};

/// Core environment.
///
/// Contains all external dependencies needed by the engines.
///
/// # Type Parameters
///
/// - `S`: graph store
/// - `M`: message dispatcher
/// - `C`: clock
#[derive(Clone)]
pub struct CoreEnvironment<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    /// Graph store handle.
    pub store: S,

    /// Outbound message dispatcher.
    pub dispatcher: M,

    /// Time source.
    pub clock: C,

    /// Process-wide configuration, read at startup and never mutated.
    pub config: CoreConfig,
}

impl<S, M, C> CoreEnvironment<S, M, C>
where
    S: GraphStore + Clone,
    M: MessageDispatcher + Clone,
    C: Clock + Clone,
{
    /// Create a new environment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the configuration fails its
    /// startup validation.
    ///
    /// [`CoreError::Config`]: crate::error::CoreError::Config
    pub fn new(
        store: S,
        dispatcher: M,
        clock: C,
        config: CoreConfig,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            dispatcher,
            clock,
            config,
        })
    }
}
