use anyhow::Context;
use patch_dataset::{label_variant_for_rate, LoaderConfig, PatchLoader, PatchStore};
use std::path::Path;
use std::sync::Arc;

/// Loader settings derived from the command line.
#[derive(Debug, Clone)]
pub struct DatasetPathConfig<'a> {
    pub path: &'a Path,
    pub rate: usize,
    pub batch_size: usize,
    pub threads: usize,
    pub shuffle: bool,
    pub seed: u64,
}

/// Open the dataset, pick the label variant for `rate` and check that it is
/// really `rate` times the input. Fails before any training starts.
pub fn open_patch_loader(cfg: &DatasetPathConfig<'_>) -> anyhow::Result<PatchLoader> {
    let store = PatchStore::open(cfg.path)
        .with_context(|| format!("failed to load dataset at {}", cfg.path.display()))?;
    let label = label_variant_for_rate(cfg.rate);
    if label >= store.variant_count() {
        anyhow::bail!(
            "rate {} needs label variant {label}, but {} only has {:?}",
            cfg.rate,
            cfg.path.display(),
            store.variant_names()
        );
    }
    store
        .check_scale(0, label, cfg.rate)
        .with_context(|| format!("dataset {} does not match --rate", cfg.path.display()))?;

    let loader = PatchLoader::new(
        Arc::new(store),
        LoaderConfig {
            batch_size: cfg.batch_size.max(1),
            workers: cfg.threads.max(1),
            prefetch: 2,
            shuffle: cfg.shuffle,
            seed: cfg.seed,
            input_variant: 0,
            label_variant: label,
        },
    )?;
    tracing::info!(
        samples = loader.num_samples(),
        batches = loader.len(),
        input = ?loader.input_shape(),
        label = ?loader.label_shape(),
        "dataset ready"
    );
    Ok(loader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patch_dataset::{write_shards, PatchVariant, VariantShape};

    fn write_pyramid(dir: &Path) -> std::path::PathBuf {
        let n = 3;
        let mk = |name: &str, side: usize| {
            let shape = VariantShape::new(1, side, side);
            PatchVariant::new(name, shape, vec![0.5; n * shape.numel()])
        };
        let store = PatchStore::new(vec![mk("data", 2), mk("label_x2", 4), mk("label_x4", 8)])
            .unwrap();
        write_shards(&store, dir, 8).unwrap()
    }

    fn cfg(path: &Path, rate: usize) -> DatasetPathConfig<'_> {
        DatasetPathConfig {
            path,
            rate,
            batch_size: 2,
            threads: 1,
            shuffle: true,
            seed: 1,
        }
    }

    #[test]
    fn picks_label_by_rate() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_pyramid(dir.path());
        let loader = open_patch_loader(&cfg(&manifest, 2)).unwrap();
        assert_eq!(loader.label_shape(), VariantShape::new(1, 4, 4));
        let loader = open_patch_loader(&cfg(&manifest, 4)).unwrap();
        assert_eq!(loader.label_shape(), VariantShape::new(1, 8, 8));
        assert_eq!(loader.len(), 2);
    }

    #[test]
    fn rate_that_does_not_match_labels_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_pyramid(dir.path());
        let Err(err) = open_patch_loader(&cfg(&manifest, 3)) else {
            panic!("rate 3 should not match a x2/x4 pyramid");
        };
        assert!(format!("{err:#}").contains("rate 3"), "{err:#}");
    }

    #[test]
    fn missing_dataset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.h5");
        assert!(open_patch_loader(&cfg(&missing, 2)).is_err());
    }
}
