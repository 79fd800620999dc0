//! In-memory patch store shared by every reader backend.

use crate::types::{DatasetResult, PatchDatasetError, PatchVariant, VariantShape};
use std::path::Path;

/// Aligned resolution variants of the same patches, indexed by position.
#[derive(Debug, Clone)]
pub struct PatchStore {
    samples: usize,
    variants: Vec<PatchVariant>,
}

impl PatchStore {
    /// Build a store from already-loaded variants. Every variant must hold the
    /// same number of samples and the store must not be empty.
    pub fn new(variants: Vec<PatchVariant>) -> DatasetResult<Self> {
        let first = variants
            .first()
            .ok_or_else(|| PatchDatasetError::Other("dataset has no variants".into()))?;
        let samples = first.samples();
        for variant in &variants {
            let numel = variant.shape.numel();
            if numel == 0 {
                return Err(PatchDatasetError::Other(format!(
                    "variant {} has an empty sample shape {:?}",
                    variant.name, variant.shape
                )));
            }
            if variant.data.len() % numel != 0 {
                return Err(PatchDatasetError::Other(format!(
                    "variant {} holds {} values, not a multiple of {numel}",
                    variant.name,
                    variant.data.len()
                )));
            }
            if variant.samples() != samples {
                return Err(PatchDatasetError::Other(format!(
                    "variant {} has {} samples, expected {samples}",
                    variant.name,
                    variant.samples()
                )));
            }
        }
        if samples == 0 {
            return Err(PatchDatasetError::Other("dataset contains no samples".into()));
        }
        Ok(Self { samples, variants })
    }

    /// Open a dataset file, picking the reader from the extension:
    /// `.h5`/`.hdf5` go through HDF5, `.json` is a shard manifest.
    pub fn open(path: &Path) -> DatasetResult<Self> {
        if !path.exists() {
            return Err(PatchDatasetError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "dataset not found"),
            });
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let store = match ext.as_deref() {
            Some("h5") | Some("hdf5") => open_hdf5(path)?,
            Some("json") => crate::shards::load_manifest(path)?,
            _ => {
                return Err(PatchDatasetError::Format {
                    path: path.to_path_buf(),
                    msg: "expected an .h5/.hdf5 file or a shard manifest (.json)".into(),
                })
            }
        };
        tracing::info!(
            path = %path.display(),
            samples = store.len(),
            variants = ?store.variant_names(),
            "opened patch dataset"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn variants(&self) -> &[PatchVariant] {
        &self.variants
    }

    pub fn variant(&self, index: usize) -> DatasetResult<&PatchVariant> {
        self.variants
            .get(index)
            .ok_or(PatchDatasetError::MissingVariant {
                index,
                count: self.variants.len(),
            })
    }

    pub fn shape(&self, variant: usize) -> DatasetResult<VariantShape> {
        self.variant(variant).map(|v| v.shape)
    }

    /// Borrow one sample of one variant. Callers validate indices up front.
    pub fn sample(&self, variant: usize, index: usize) -> &[f32] {
        let v = &self.variants[variant];
        let numel = v.shape.numel();
        &v.data[index * numel..(index + 1) * numel]
    }

    /// Check that `label` is `input` upscaled by `rate` in both spatial dims.
    pub fn check_scale(&self, input: usize, label: usize, rate: usize) -> DatasetResult<()> {
        let lo = self.variant(input)?;
        let hi = self.variant(label)?;
        let expected_h = lo.shape.height * rate;
        let expected_w = lo.shape.width * rate;
        if hi.shape.height != expected_h || hi.shape.width != expected_w {
            return Err(PatchDatasetError::ScaleMismatch {
                label: hi.name.clone(),
                rate,
                expected_h,
                expected_w,
                actual_h: hi.shape.height,
                actual_w: hi.shape.width,
            });
        }
        if hi.shape.channels != lo.shape.channels {
            return Err(PatchDatasetError::Other(format!(
                "variant {} has {} channels but {} has {}",
                hi.name, hi.shape.channels, lo.name, lo.shape.channels
            )));
        }
        Ok(())
    }
}

/// Label variant used for a given upscale rate: `floor(sqrt(rate))`, so rate
/// 2 and 3 read variant 1 and rate 4 reads variant 2 of a pyramid file.
pub fn label_variant_for_rate(rate: usize) -> usize {
    ((rate as f64).sqrt().floor() as usize).max(1)
}

#[cfg(feature = "hdf5")]
fn open_hdf5(path: &Path) -> DatasetResult<PatchStore> {
    crate::h5::load_hdf5(path)
}

#[cfg(not(feature = "hdf5"))]
fn open_hdf5(path: &Path) -> DatasetResult<PatchStore> {
    Err(PatchDatasetError::Format {
        path: path.to_path_buf(),
        msg: "hdf5 feature not enabled; rebuild with --features hdf5 or convert the file with pack_patches".into(),
    })
}
