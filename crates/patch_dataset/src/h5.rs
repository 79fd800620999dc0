//! HDF5 reader (`hdf5` feature).

use crate::store::PatchStore;
use crate::types::{DatasetResult, PatchDatasetError, PatchVariant, VariantShape};
use std::path::Path;

pub const INPUT_DATASET: &str = "data";
/// Label datasets, read in this order after `data`.
pub const LABEL_DATASETS: [&str; 5] = ["label", "label_x2", "label_x3", "label_x4", "label_x8"];

pub fn load_hdf5(path: &Path) -> DatasetResult<PatchStore> {
    let h5err = |e: hdf5::Error| PatchDatasetError::Hdf5 {
        path: path.to_path_buf(),
        msg: e.to_string(),
    };
    let file = hdf5::File::open(path).map_err(h5err)?;
    if !file.link_exists(INPUT_DATASET) {
        return Err(PatchDatasetError::Format {
            path: path.to_path_buf(),
            msg: format!("missing `{INPUT_DATASET}` dataset"),
        });
    }
    let mut variants = vec![read_variant(&file, INPUT_DATASET, path)?];
    for name in LABEL_DATASETS {
        if file.link_exists(name) {
            variants.push(read_variant(&file, name, path)?);
        }
    }
    if variants.len() < 2 {
        return Err(PatchDatasetError::Format {
            path: path.to_path_buf(),
            msg: format!("no label dataset found (looked for {LABEL_DATASETS:?})"),
        });
    }
    PatchStore::new(variants)
}

fn read_variant(file: &hdf5::File, name: &str, path: &Path) -> DatasetResult<PatchVariant> {
    let h5err = |e: hdf5::Error| PatchDatasetError::Hdf5 {
        path: path.to_path_buf(),
        msg: format!("{name}: {e}"),
    };
    let ds = file.dataset(name).map_err(h5err)?;
    let dims = ds.shape();
    // [N, H, W] is read as single-channel.
    let shape = match dims.as_slice() {
        [_, c, h, w] => VariantShape::new(*c, *h, *w),
        [_, h, w] => VariantShape::new(1, *h, *w),
        other => {
            return Err(PatchDatasetError::Format {
                path: path.to_path_buf(),
                msg: format!("dataset `{name}` has shape {other:?}, expected [N, C, H, W]"),
            })
        }
    };
    let data = ds.read_raw::<f32>().map_err(h5err)?;
    Ok(PatchVariant::new(name, shape, data))
}
