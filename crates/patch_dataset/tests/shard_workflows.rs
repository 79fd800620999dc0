//! End-to-end shard workflows: store -> shards -> store -> batches.

use patch_dataset::{
    write_shards, LoaderConfig, PatchDatasetError, PatchLoader, PatchStore, PatchVariant,
    ShardManifest, VariantShape, MANIFEST_FILE,
};
use std::fs;
use std::sync::Arc;

fn synthetic_store(samples: usize) -> PatchStore {
    let lo = VariantShape::new(1, 3, 3);
    let hi = VariantShape::new(1, 6, 6);
    let lo_data = (0..samples * lo.numel()).map(|v| v as f32 * 0.5).collect();
    let hi_data = (0..samples * hi.numel()).map(|v| v as f32 * -0.25).collect();
    PatchStore::new(vec![
        PatchVariant::new("data", lo, lo_data),
        PatchVariant::new("label_x2", hi, hi_data),
    ])
    .unwrap()
}

#[test]
fn shards_reload_identically_across_shard_boundaries() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = synthetic_store(11);
    let manifest_path = write_shards(&store, dir.path(), 4)?;
    assert_eq!(manifest_path, dir.path().join(MANIFEST_FILE));

    let manifest = ShardManifest::load(&manifest_path)?;
    assert_eq!(manifest.shards.len(), 3);
    assert_eq!(manifest.total_samples(), 11);

    let reloaded = PatchStore::open(&manifest_path)?;
    assert_eq!(reloaded.len(), 11);
    assert_eq!(reloaded.variant_names(), vec!["data", "label_x2"]);
    for idx in [0, 3, 4, 10] {
        assert_eq!(reloaded.sample(0, idx), store.sample(0, idx));
        assert_eq!(reloaded.sample(1, idx), store.sample(1, idx));
    }
    reloaded.check_scale(0, 1, 2)?;
    Ok(())
}

#[test]
fn corrupted_shard_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manifest_path = write_shards(&synthetic_store(4), dir.path(), 4)?;
    let shard = dir.path().join("shard_00000.bin");
    let mut bytes = fs::read(&shard)?;
    bytes[0] = b'X';
    fs::write(&shard, &bytes)?;
    let err = PatchStore::open(&manifest_path).unwrap_err();
    assert!(matches!(err, PatchDatasetError::Shard { .. }), "{err}");

    bytes[0] = b'S';
    bytes.truncate(bytes.len() - 8);
    fs::write(&shard, &bytes)?;
    let err = PatchStore::open(&manifest_path).unwrap_err();
    assert!(err.to_string().contains("truncated"), "{err}");
    Ok(())
}

#[test]
fn absurd_manifest_sample_count_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manifest_path = write_shards(&synthetic_store(4), dir.path(), 4)?;
    let mut manifest = ShardManifest::load(&manifest_path)?;
    manifest.shards[0].samples = usize::MAX / 8;
    manifest.save(&manifest_path)?;
    let err = PatchStore::open(&manifest_path).unwrap_err();
    assert!(matches!(err, PatchDatasetError::Shard { .. }), "{err}");
    assert!(err.to_string().contains("manifest says"), "{err}");
    Ok(())
}

#[test]
fn unknown_extension_is_a_format_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("patches.csv");
    fs::write(&path, "0,1,2")?;
    assert!(matches!(
        PatchStore::open(&path),
        Err(PatchDatasetError::Format { .. })
    ));
    Ok(())
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn hdf5_without_feature_explains_itself() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("train.h5");
    fs::write(&path, b"not really hdf5")?;
    let err = PatchStore::open(&path).unwrap_err();
    assert!(err.to_string().contains("hdf5 feature"), "{err}");
    Ok(())
}

#[cfg(feature = "burn-runtime")]
#[test]
fn batches_convert_to_nchw_tensors() -> anyhow::Result<()> {
    type B = burn_ndarray::NdArray<f32>;
    let store = Arc::new(synthetic_store(5));
    let loader = PatchLoader::new(
        store,
        LoaderConfig {
            batch_size: 2,
            shuffle: false,
            ..LoaderConfig::default()
        },
    )?;
    let device = <B as burn::tensor::backend::Backend>::Device::default();
    let batches: Vec<_> = loader.iter_epoch(0).collect();
    assert_eq!(batches.len(), 3);
    let (input, label) = batches[2].to_tensors::<B>(&device);
    assert_eq!(input.dims(), [1, 1, 3, 3]);
    assert_eq!(label.dims(), [1, 1, 6, 6]);
    let first: Vec<f32> = input.into_data().to_vec::<f32>().unwrap();
    assert_eq!(first[0], (4 * 9) as f32 * 0.5);
    Ok(())
}
