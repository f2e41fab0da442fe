use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::debug;
use parking_lot::Mutex;

use super::ComputationGraph;
use crate::{Result, config::TopologyConfig, params::ModelParams};

/// Idle graphs of a single topology, kept across batches so their node arrays are allocated
/// once per worker instead of once per batch.
#[derive(Debug)]
pub struct GraphPool {
    config: TopologyConfig,
    params: ModelParams,
    idle: Mutex<Vec<ComputationGraph>>,
    built: AtomicUsize,
}

impl GraphPool {
    /// Creates an empty pool, graphs are built lazily on checkout.
    ///
    /// # Returns
    /// A configuration error if the units don't fit the topology.
    pub fn new(config: TopologyConfig, params: ModelParams) -> Result<Self> {
        config.verify()?;
        params.check(&config)?;

        Ok(Self {
            config,
            params,
            idle: Mutex::new(Vec::new()),
            built: AtomicUsize::new(0),
        })
    }

    /// Takes an idle graph, or builds one if every graph is checked out.
    ///
    /// The graph goes back to the pool when the returned guard is dropped.
    pub fn checkout(&self) -> PooledGraph<'_> {
        let idle = self.idle.lock().pop();
        let graph = match idle {
            Some(graph) => graph,
            None => {
                let built = self.built.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(built = built; "growing graph pool");
                // SAFETY: `new` already checked that the units fit this topology.
                ComputationGraph::new(&self.config, &self.params)
                    .expect("pooled units fit their own topology")
            }
        };

        PooledGraph {
            pool: self,
            graph: Some(graph),
        }
    }

    /// The amount of graphs built since the pool was created.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }

    /// The amount of graphs waiting for a checkout.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A graph checked out of a [`GraphPool`].
#[derive(Debug)]
pub struct PooledGraph<'a> {
    pool: &'a GraphPool,
    graph: Option<ComputationGraph>,
}

impl Deref for PooledGraph<'_> {
    type Target = ComputationGraph;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The graph is only taken out on drop.
        self.graph.as_ref().expect("pooled graph present until drop")
    }
}

impl DerefMut for PooledGraph<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The graph is only taken out on drop.
        self.graph.as_mut().expect("pooled graph present until drop")
    }
}

impl Drop for PooledGraph<'_> {
    fn drop(&mut self) {
        if let Some(graph) = self.graph.take() {
            self.pool.idle.lock().push(graph);
        }
    }
}
