//! Shard manifest and binary shard storage.
//!
//! A manifest (`manifest.json`) lists the variants and the shard files next to
//! it. Each shard holds every variant for a contiguous range of samples:
//!
//! ```text
//! 0   magic "SRP1"
//! 4   version  u32
//! 8   variants u32
//! 12  reserved u32
//! 16  samples  u64
//! 24  per variant: channels u32, height u32, width u32, reserved u32, offset u64
//! ..  little-endian f32 payload, one block per variant
//! ```

use crate::store::PatchStore;
use crate::types::{now_ms, DatasetResult, PatchDatasetError, PatchVariant, VariantShape};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SHARD_MAGIC: &[u8; 4] = b"SRP1";
pub const SHARD_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

const HEADER_LEN: usize = 24;
const VARIANT_ENTRY_LEN: usize = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: String,
    pub shape: VariantShape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEntry {
    pub id: String,
    /// Path to the shard file, relative to the manifest directory (UTF-8).
    pub relative_path: String,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardManifest {
    pub format_version: u32,
    pub variants: Vec<VariantSpec>,
    pub shards: Vec<ShardEntry>,
    pub created_at_ms: u64,
}

impl ShardManifest {
    pub fn total_samples(&self) -> usize {
        self.shards
            .iter()
            .fold(0usize, |acc, s| acc.saturating_add(s.samples))
    }

    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| PatchDatasetError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data =
            serde_json::to_vec_pretty(self).map_err(|e| PatchDatasetError::Other(e.to_string()))?;
        fs::write(path, data).map_err(|e| PatchDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| PatchDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&raw).map_err(|e| PatchDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Write `store` as shards of at most `shard_size` samples plus a manifest in
/// `out_dir`. Returns the manifest path.
pub fn write_shards(store: &PatchStore, out_dir: &Path, shard_size: usize) -> DatasetResult<PathBuf> {
    fs::create_dir_all(out_dir).map_err(|e| PatchDatasetError::Io {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    let shard_size = shard_size.max(1);
    let shapes: Vec<VariantShape> = store.variants().iter().map(|v| v.shape).collect();

    let mut shards = Vec::new();
    let mut start = 0usize;
    while start < store.len() {
        let end = (start + shard_size).min(store.len());
        let id = format!("shard_{:05}", shards.len());
        let relative_path = format!("{id}.bin");
        let path = out_dir.join(&relative_path);
        let bytes = encode_shard(store, &shapes, start, end);
        fs::write(&path, bytes).map_err(|e| PatchDatasetError::Io {
            path: path.clone(),
            source: e,
        })?;
        shards.push(ShardEntry {
            id,
            relative_path,
            samples: end - start,
        });
        start = end;
    }

    let manifest = ShardManifest {
        format_version: SHARD_VERSION,
        variants: store
            .variants()
            .iter()
            .map(|v| VariantSpec {
                name: v.name.clone(),
                shape: v.shape,
            })
            .collect(),
        shards,
        created_at_ms: now_ms(),
    };
    let manifest_path = out_dir.join(MANIFEST_FILE);
    manifest.save(&manifest_path)?;
    tracing::info!(
        manifest = %manifest_path.display(),
        shards = manifest.shards.len(),
        samples = manifest.total_samples(),
        "wrote patch shards"
    );
    Ok(manifest_path)
}

fn encode_shard(store: &PatchStore, shapes: &[VariantShape], start: usize, end: usize) -> Vec<u8> {
    let samples = end - start;
    let header_len = HEADER_LEN + VARIANT_ENTRY_LEN * shapes.len();
    let payload: usize = shapes.iter().map(|s| s.numel() * samples * 4).sum();
    let mut out = Vec::with_capacity(header_len + payload);

    out.extend_from_slice(SHARD_MAGIC);
    out.extend_from_slice(&SHARD_VERSION.to_le_bytes());
    out.extend_from_slice(&(shapes.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(samples as u64).to_le_bytes());

    let mut offset = header_len;
    for shape in shapes {
        out.extend_from_slice(&(shape.channels as u32).to_le_bytes());
        out.extend_from_slice(&(shape.height as u32).to_le_bytes());
        out.extend_from_slice(&(shape.width as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(offset as u64).to_le_bytes());
        offset += shape.numel() * samples * 4;
    }

    for (vi, _) in shapes.iter().enumerate() {
        for idx in start..end {
            for v in store.sample(vi, idx) {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out
}

/// Load every shard listed in the manifest into a [`PatchStore`].
pub fn load_manifest(manifest_path: &Path) -> DatasetResult<PatchStore> {
    let manifest = ShardManifest::load(manifest_path)?;
    if manifest.format_version != SHARD_VERSION {
        return Err(PatchDatasetError::Format {
            path: manifest_path.to_path_buf(),
            msg: format!(
                "manifest version {} not supported (expected {SHARD_VERSION})",
                manifest.format_version
            ),
        });
    }
    let root = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let shapes: Vec<VariantShape> = manifest.variants.iter().map(|v| v.shape).collect();
    // Sample counts come from the manifest; buffers grow from what the shards actually hold.
    let mut buffers: Vec<Vec<f32>> = vec![Vec::new(); shapes.len()];

    for entry in &manifest.shards {
        let path = root.join(&entry.relative_path);
        let data = fs::read(&path).map_err(|e| PatchDatasetError::Io {
            path: path.clone(),
            source: e,
        })?;
        let samples = decode_shard(&path, &data, &shapes, &mut buffers)?;
        if samples != entry.samples {
            return Err(PatchDatasetError::Shard {
                path,
                msg: format!(
                    "holds {samples} samples, manifest says {}",
                    entry.samples
                ),
            });
        }
        tracing::debug!(shard = %entry.id, samples, "loaded shard");
    }

    let variants = manifest
        .variants
        .into_iter()
        .zip(buffers)
        .map(|(spec, data)| PatchVariant::new(spec.name, spec.shape, data))
        .collect();
    PatchStore::new(variants)
}

fn read_u32_le(data: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(data);
    u32::from_le_bytes(arr)
}

fn read_u64_le(data: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(data);
    u64::from_le_bytes(arr)
}

/// Parse one shard, appending each variant's payload to `out`. Returns the
/// number of samples in the shard.
fn decode_shard(
    path: &Path,
    data: &[u8],
    expected: &[VariantShape],
    out: &mut [Vec<f32>],
) -> DatasetResult<usize> {
    let bad = |msg: String| PatchDatasetError::Shard {
        path: path.to_path_buf(),
        msg,
    };
    if data.len() < HEADER_LEN {
        return Err(bad("too small".into()));
    }
    if &data[0..4] != SHARD_MAGIC {
        return Err(bad("bad magic".into()));
    }
    let version = read_u32_le(&data[4..8]);
    if version != SHARD_VERSION {
        return Err(bad(format!("shard version {version} vs {SHARD_VERSION}")));
    }
    let variants = read_u32_le(&data[8..12]) as usize;
    if variants != expected.len() {
        return Err(bad(format!(
            "holds {variants} variants, manifest lists {}",
            expected.len()
        )));
    }
    let samples = read_u64_le(&data[16..24]) as usize;
    if data.len() < HEADER_LEN + VARIANT_ENTRY_LEN * variants {
        return Err(bad("truncated variant table".into()));
    }

    for (vi, shape) in expected.iter().enumerate() {
        let base = HEADER_LEN + vi * VARIANT_ENTRY_LEN;
        let found = VariantShape::new(
            read_u32_le(&data[base..base + 4]) as usize,
            read_u32_le(&data[base + 4..base + 8]) as usize,
            read_u32_le(&data[base + 8..base + 12]) as usize,
        );
        if found != *shape {
            return Err(bad(format!(
                "variant {vi} shape {found:?} does not match manifest {shape:?}"
            )));
        }
        let offset = read_u64_le(&data[base + 16..base + 24]) as usize;
        let bytes = shape
            .numel()
            .checked_mul(samples)
            .and_then(|v| v.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| bad("overflow computing payload size".into()))?;
        if offset.checked_add(bytes).map_or(true, |end| end > data.len()) {
            return Err(bad("truncated".into()));
        }
        out[vi].extend(data[offset..offset + bytes].chunks_exact(4).map(|c| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(c);
            f32::from_le_bytes(arr)
        }));
    }
    Ok(samples)
}
