//! Paired low/high resolution patch datasets for super-resolution training.
//!
//! This crate provides:
//! - An in-memory store of aligned resolution variants
//! - HDF5 reading (`hdf5` feature) and a portable shard format
//! - A shuffled, prefetching mini-batch loader with Burn tensor conversion

pub mod loader;
pub mod shards;
pub mod store;
pub mod types;

#[cfg(feature = "hdf5")]
pub mod h5;

pub use loader::{EpochIter, LoaderConfig, PatchBatch, PatchLoader};
pub use shards::{load_manifest, write_shards, ShardManifest, MANIFEST_FILE};
pub use store::{label_variant_for_rate, PatchStore};
pub use types::*;
