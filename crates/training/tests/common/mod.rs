#![allow(dead_code)]

use clap::Parser;
use patch_dataset::{write_shards, PatchStore, PatchVariant, VariantShape};
use std::path::{Path, PathBuf};
use training::TrainArgs;

/// Six 4x4 inputs with 8x8 labels, written as a shard manifest.
pub fn synthetic_dataset(dir: &Path) -> anyhow::Result<PathBuf> {
    let samples = 6;
    let lo = VariantShape::new(1, 4, 4);
    let hi = VariantShape::new(1, 8, 8);
    let lo_data = (0..samples * lo.numel())
        .map(|i| ((i * 37) % 17) as f32 / 17.0)
        .collect();
    let hi_data = (0..samples * hi.numel())
        .map(|i| ((i * 13) % 23) as f32 / 23.0)
        .collect();
    let store = PatchStore::new(vec![
        PatchVariant::new("data", lo, lo_data),
        PatchVariant::new("label", hi, hi_data),
    ])?;
    Ok(write_shards(&store, &dir.join("shards"), 4)?)
}

pub fn train_args(dataset: &Path, checkpoint_dir: &Path, extra: &[&str]) -> TrainArgs {
    let mut argv: Vec<String> = vec![
        "train".into(),
        "--datasets".into(),
        dataset.display().to_string(),
        "--checkpoint-dir".into(),
        checkpoint_dir.display().to_string(),
        "--blocks".into(),
        "1".into(),
        "--batchSize".into(),
        "4".into(),
        "--log-every".into(),
        "1".into(),
        "--seed".into(),
        "11".into(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    TrainArgs::parse_from(argv)
}
