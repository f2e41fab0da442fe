use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    sync::Arc,
};

use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{
    LabelerErr, Result,
    config::{ModelConfig, TopologyConfig},
    feature::Feature,
    optimization::Optimizer,
    params::{Gradients, ModelParams, ParameterHandle, ParameterStore},
    persist,
    topology::{ComputationGraph, GraphPool},
};

/// A labeler's model: its topology, its units and the store they live in.
///
/// Batches are evaluated in parallel, one [`ComputationGraph`] per worker thread, all of them
/// reading the same store. Worker graphs are pooled and survive across batches; clones share
/// both the store and the pool.
#[derive(Debug, Clone)]
pub struct Labeler {
    config: TopologyConfig,
    params: ModelParams,
    store: ParameterHandle,
    graphs: Arc<GraphPool>,
}

impl Labeler {
    /// Creates a new randomly initialized `Labeler`.
    ///
    /// # Arguments
    /// * `config` - The derived topology, its seed makes initialization deterministic.
    pub fn new(config: TopologyConfig) -> Result<Self> {
        let (params, layout) = ModelParams::new(&config)?;
        let mut store = ParameterStore::new(layout);

        let rng = match config.hyper().seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        params.initialize(&mut store, rng)?;

        info!(variant = config.variant().name(), params = store.len(); "initialized labeler");
        Self::assemble(config, params, store)
    }

    /// Derives the topology of a model configuration and initializes it.
    pub fn from_config(config: ModelConfig) -> Result<Self> {
        Self::new(TopologyConfig::derive(config.variant, config.hyper, config.dims)?)
    }

    /// Wraps an already populated store.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the store wasn't laid out for this topology.
    pub fn from_store(config: TopologyConfig, store: ParameterStore) -> Result<Self> {
        let (params, layout) = ModelParams::new(&config)?;

        if **store.layout() != *layout {
            return Err(LabelerErr::SizeMismatch {
                what: "stored parameters",
                got: store.len(),
                expected: layout.size(),
            });
        }

        Self::assemble(config, params, store)
    }

    fn assemble(
        config: TopologyConfig,
        params: ModelParams,
        store: ParameterStore,
    ) -> Result<Self> {
        let graphs = GraphPool::new(config.clone(), params.clone())?;

        Ok(Self {
            config,
            params,
            store: ParameterHandle::new(store),
            graphs: Arc::new(graphs),
        })
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn handle(&self) -> &ParameterHandle {
        &self.store
    }

    /// Builds a new graph bound to this labeler's units.
    pub fn graph(&self) -> Result<ComputationGraph> {
        ComputationGraph::new(&self.config, &self.params)
    }

    /// Overwrites rows of an embedding table with externally supplied vectors.
    ///
    /// # Arguments
    /// * `chars` - Whether to write the char table instead of the word table.
    /// * `rows` - The id and the new embedding of every row to overwrite.
    pub fn load_embeddings<'a, I>(&self, chars: bool, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, &'a [f32])>,
    {
        let table = match (chars, self.params.chars) {
            (false, _) => self.params.words.table,
            (true, Some(lookup)) => lookup.table,
            (true, None) => return Err(LabelerErr::UnknownTensor("chars.E".to_string())),
        };

        let mut store = self.store.write();
        for (id, row) in rows {
            store.set_row(table, id, row)?;
        }
        Ok(())
    }

    /// Predicts the label of every example in parallel.
    ///
    /// # Returns
    /// The labels in input order, or the first input contract violation.
    pub fn predict_batch(&self, features: &[Feature]) -> Result<Vec<usize>> {
        let store = self.store.read();
        let store: &ParameterStore = &store;

        features
            .par_iter()
            .map_init(
                || self.graphs.checkout(),
                |graph, feature| {
                    graph.forward(store, feature, false)?;
                    Ok::<_, LabelerErr>(graph.predict())
                },
            )
            .collect()
    }

    /// Computes the summed gradient and loss of a batch in parallel.
    ///
    /// When the topology is seeded, example `i` draws its dropout masks from `seed + i` so the
    /// result doesn't depend on how the batch is split among workers.
    ///
    /// # Arguments
    /// * `examples` - Every example with its gold label.
    ///
    /// # Returns
    /// The summed gradients and the summed loss.
    pub fn compute_gradients(&self, examples: &[(Feature, usize)]) -> Result<(Gradients, f32)> {
        let store = self.store.read();
        let store: &ParameterStore = &store;
        let layout = store.layout();
        let seed = self.config.hyper().seed;

        examples
            .par_iter()
            .enumerate()
            .try_fold(
                || (self.graphs.checkout(), Gradients::new(layout.clone()), 0.),
                |(mut graph, mut grads, loss), (i, (feature, gold))| {
                    if let Some(seed) = seed {
                        graph.reseed(seed.wrapping_add(i as u64));
                    }
                    graph.forward(store, feature, true)?;
                    let example_loss = graph.backward(store, *gold, &mut grads)?;
                    Ok::<_, LabelerErr>((graph, grads, loss + example_loss))
                },
            )
            .map(|acc| acc.map(|(_, grads, loss)| (grads, loss)))
            .try_reduce(
                || (Gradients::new(layout.clone()), 0.),
                |(mut acc, acc_loss), (grads, loss)| {
                    acc.accumulate(&grads)?;
                    Ok((acc, acc_loss + loss))
                },
            )
    }

    /// Updates the store with the given gradients.
    pub fn apply<O: Optimizer + ?Sized>(&self, optimizer: &mut O, grads: &Gradients) -> Result<()> {
        self.store.apply(optimizer, grads)
    }

    /// Runs one optimization step over a batch, averaging its gradients.
    ///
    /// # Returns
    /// The mean loss of the batch, before the update.
    pub fn train_batch<O: Optimizer + ?Sized>(
        &self,
        optimizer: &mut O,
        examples: &[(Feature, usize)],
    ) -> Result<f32> {
        if examples.is_empty() {
            return Ok(0.);
        }

        let (mut grads, loss) = self.compute_gradients(examples)?;
        let n = examples.len() as f32;
        grads.scale(1. / n);
        self.apply(optimizer, &grads)?;

        debug!(examples = examples.len(), loss = loss / n; "trained batch");
        Ok(loss / n)
    }

    /// Writes the model to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        persist::save(&mut writer, self)
    }

    /// Reads a model previously written with [`Labeler::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        persist::load(&mut reader)
    }
}
