//! Shuffled mini-batch loader with background prefetch.
//!
//! Batch `b` of an epoch is assembled by worker `b % workers`; each worker owns
//! a bounded channel and the consumer drains them round-robin, so batch order
//! does not depend on the worker count.

use crate::store::PatchStore;
use crate::types::{DatasetResult, PatchDatasetError, VariantShape};
use crossbeam_channel::{bounded, Receiver};
use rand::prelude::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Background batch builders. Zero is treated as one.
    pub workers: usize,
    /// Batches each worker may queue ahead of the consumer.
    pub prefetch: usize,
    pub shuffle: bool,
    /// Epoch `e` is shuffled with `seed + e`.
    pub seed: u64,
    pub input_variant: usize,
    pub label_variant: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            workers: 1,
            prefetch: 2,
            shuffle: true,
            seed: 0,
            input_variant: 0,
            label_variant: 1,
        }
    }
}

/// One mini-batch, flattened NCHW.
#[derive(Debug, Clone)]
pub struct PatchBatch {
    /// Store indices of the samples in this batch, in batch order.
    pub indices: Vec<usize>,
    pub input: Vec<f32>,
    pub label: Vec<f32>,
    pub input_shape: VariantShape,
    pub label_shape: VariantShape,
}

impl PatchBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[cfg(feature = "burn-runtime")]
    pub fn to_tensors<B: burn::tensor::backend::Backend>(
        &self,
        device: &B::Device,
    ) -> (burn::tensor::Tensor<B, 4>, burn::tensor::Tensor<B, 4>) {
        let n = self.len();
        let s = self.input_shape;
        let input = burn::tensor::Tensor::<B, 1>::from_floats(self.input.as_slice(), device)
            .reshape([n, s.channels, s.height, s.width]);
        let s = self.label_shape;
        let label = burn::tensor::Tensor::<B, 1>::from_floats(self.label.as_slice(), device)
            .reshape([n, s.channels, s.height, s.width]);
        (input, label)
    }
}

#[derive(Debug)]
pub struct PatchLoader {
    store: Arc<PatchStore>,
    cfg: LoaderConfig,
}

impl PatchLoader {
    pub fn new(store: Arc<PatchStore>, cfg: LoaderConfig) -> DatasetResult<Self> {
        if cfg.batch_size == 0 {
            return Err(PatchDatasetError::Other("batch size must be positive".into()));
        }
        store.variant(cfg.input_variant)?;
        store.variant(cfg.label_variant)?;
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.cfg
    }

    /// Batches per epoch; the last one may be short.
    pub fn len(&self) -> usize {
        self.store.len().div_ceil(self.cfg.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_samples(&self) -> usize {
        self.store.len()
    }

    pub fn input_shape(&self) -> VariantShape {
        self.store.variants()[self.cfg.input_variant].shape
    }

    pub fn label_shape(&self) -> VariantShape {
        self.store.variants()[self.cfg.label_variant].shape
    }

    /// Sample visiting order for `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.store.len()).collect();
        if self.cfg.shuffle {
            let mut rng = rand::rngs::StdRng::seed_from_u64(self.cfg.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    pub fn iter_epoch(&self, epoch: usize) -> EpochIter {
        let order = Arc::new(self.epoch_order(epoch));
        let total = self.len();
        let workers = self.cfg.workers.max(1).min(total.max(1));
        let mut receivers = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, rx) = bounded(self.cfg.prefetch.max(1));
            let store = self.store.clone();
            let order = order.clone();
            let batch_size = self.cfg.batch_size;
            let input_variant = self.cfg.input_variant;
            let label_variant = self.cfg.label_variant;
            handles.push(thread::spawn(move || {
                for b in (worker..total).step_by(workers) {
                    let start = b * batch_size;
                    let end = (start + batch_size).min(order.len());
                    let batch =
                        assemble(&store, &order[start..end], input_variant, label_variant);
                    // Consumer hung up.
                    if tx.send(batch).is_err() {
                        break;
                    }
                }
            }));
            receivers.push(rx);
        }

        EpochIter {
            receivers,
            handles,
            next: 0,
            total,
        }
    }
}

fn assemble(store: &PatchStore, indices: &[usize], input: usize, label: usize) -> PatchBatch {
    let input_shape = store.variants()[input].shape;
    let label_shape = store.variants()[label].shape;
    let mut input_buf = Vec::with_capacity(indices.len() * input_shape.numel());
    let mut label_buf = Vec::with_capacity(indices.len() * label_shape.numel());
    for &idx in indices {
        input_buf.extend_from_slice(store.sample(input, idx));
        label_buf.extend_from_slice(store.sample(label, idx));
    }
    PatchBatch {
        indices: indices.to_vec(),
        input: input_buf,
        label: label_buf,
        input_shape,
        label_shape,
    }
}

/// Batches of one epoch. Dropping it stops and joins the workers.
pub struct EpochIter {
    receivers: Vec<Receiver<PatchBatch>>,
    handles: Vec<JoinHandle<()>>,
    next: usize,
    total: usize,
}

impl EpochIter {
    pub fn remaining(&self) -> usize {
        self.total - self.next
    }

    /// Disconnect and join every worker, re-raising the first worker panic.
    fn join_workers(&mut self) {
        // Disconnect first so blocked senders return.
        self.receivers.clear();
        let mut panic = None;
        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = panic {
            if !thread::panicking() {
                std::panic::resume_unwind(payload);
            }
        }
    }
}

impl Iterator for EpochIter {
    type Item = PatchBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let rx = &self.receivers[self.next % self.receivers.len()];
        match rx.recv() {
            Ok(batch) => {
                self.next += 1;
                Some(batch)
            }
            Err(_) => {
                // A worker only drops its sender early by panicking.
                self.next = self.total;
                self.join_workers();
                tracing::warn!("loader worker exited early");
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl Drop for EpochIter {
    fn drop(&mut self) {
        self.join_workers();
    }
}
