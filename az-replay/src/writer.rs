use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytemuck::cast_slice;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::example::TrainingExample;
use crate::schema::{shard_stem, HISTORY_INDEX, PROTOCOL_VERSION, T_FEATURES, T_PI, T_Z};
use crate::store::{IterationBatch, TrainingExampleStore};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("safetensors: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
    #[error("invalid batch: {0}")]
    InvalidBatch(&'static str),
    #[error("corrupt shard {path}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },
}

/// Sidecar written next to every shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMeta {
    pub protocol_version: u32,
    pub iteration: u32,
    pub num_examples: usize,
    pub feature_len: usize,
    pub action_space: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    iteration: u32,
    shard: String,
    num_examples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryIndex {
    protocol_version: u32,
    batches: Vec<HistoryEntry>,
}

/// Persist every batch of `store` under `dir`: one shard pair per batch plus `history.json`.
///
/// `*.tmp` leftovers of an interrupted earlier write are removed first.
pub fn write_history(dir: &Path, store: &TrainingExampleStore) -> Result<(), ReplayError> {
    fs::create_dir_all(dir)?;
    cleanup_tmp_files(dir)?;
    let mut entries = Vec::with_capacity(store.num_batches());
    for batch in store.batches() {
        write_shard(dir, batch)?;
        entries.push(HistoryEntry {
            iteration: batch.iteration,
            shard: shard_stem(batch.iteration),
            num_examples: batch.examples.len(),
        });
    }
    let index = HistoryIndex {
        protocol_version: PROTOCOL_VERSION,
        batches: entries,
    };
    write_atomic(&dir.join(HISTORY_INDEX), &serde_json::to_vec_pretty(&index)?)
}

/// Load the batches written by [`write_history`], oldest first.
pub fn read_history(dir: &Path) -> Result<Vec<IterationBatch>, ReplayError> {
    let bytes = fs::read(dir.join(HISTORY_INDEX))?;
    let index: HistoryIndex = serde_json::from_slice(&bytes)?;
    if index.protocol_version != PROTOCOL_VERSION {
        return Err(ReplayError::CorruptShard {
            path: dir.join(HISTORY_INDEX),
            reason: format!("unsupported protocol_version {}", index.protocol_version),
        });
    }
    let mut out = Vec::with_capacity(index.batches.len());
    for e in &index.batches {
        let batch = read_shard(dir, &e.shard)?;
        if batch.iteration != e.iteration || batch.examples.len() != e.num_examples {
            return Err(ReplayError::CorruptShard {
                path: dir.join(format!("{}.safetensors", e.shard)),
                reason: "shard does not match history index".to_string(),
            });
        }
        out.push(batch);
    }
    Ok(out)
}

fn write_shard(dir: &Path, batch: &IterationBatch) -> Result<(), ReplayError> {
    let n = batch.examples.len();
    let Some(first) = batch.examples.first() else {
        return Err(ReplayError::InvalidBatch("empty batch"));
    };
    let f_len = first.features.len();
    let a_len = first.pi.len();

    // Flatten tensors.
    let mut features = Vec::<f32>::with_capacity(n * f_len);
    let mut pi = Vec::<f32>::with_capacity(n * a_len);
    let mut z = Vec::<f32>::with_capacity(n);
    for e in &batch.examples {
        if e.features.len() != f_len || e.pi.len() != a_len {
            return Err(ReplayError::InvalidBatch("ragged feature or policy length"));
        }
        features.extend_from_slice(&e.features);
        pi.extend_from_slice(&e.pi);
        z.push(e.z);
    }

    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    tensors.insert(
        T_FEATURES.to_string(),
        TensorView::new(Dtype::F32, vec![n, f_len], cast_slice(&features))?,
    );
    tensors.insert(
        T_PI.to_string(),
        TensorView::new(Dtype::F32, vec![n, a_len], cast_slice(&pi))?,
    );
    tensors.insert(
        T_Z.to_string(),
        TensorView::new(Dtype::F32, vec![n], cast_slice(&z))?,
    );

    let stem = shard_stem(batch.iteration);
    let st_bytes = safetensors::serialize(&tensors, &None)?;
    write_atomic(&dir.join(format!("{stem}.safetensors")), &st_bytes)?;

    let meta = ShardMeta {
        protocol_version: PROTOCOL_VERSION,
        iteration: batch.iteration,
        num_examples: n,
        feature_len: f_len,
        action_space: a_len,
    };
    write_atomic(
        &dir.join(format!("{stem}.meta.json")),
        &serde_json::to_vec_pretty(&meta)?,
    )
}

fn read_shard(dir: &Path, stem: &str) -> Result<IterationBatch, ReplayError> {
    let st_path = dir.join(format!("{stem}.safetensors"));
    let meta_bytes = fs::read(dir.join(format!("{stem}.meta.json")))?;
    let meta: ShardMeta = serde_json::from_slice(&meta_bytes)?;
    let bytes = fs::read(&st_path)?;
    let st = SafeTensors::deserialize(&bytes)?;

    let corrupt = |reason: String| ReplayError::CorruptShard {
        path: st_path.clone(),
        reason,
    };

    let n = meta.num_examples;
    let features =
        f32_tensor(&st, T_FEATURES, &[n, meta.feature_len]).map_err(corrupt)?;
    let pi = f32_tensor(&st, T_PI, &[n, meta.action_space]).map_err(corrupt)?;
    let z = f32_tensor(&st, T_Z, &[n]).map_err(corrupt)?;

    let examples = (0..n)
        .map(|i| {
            TrainingExample::new(
                features[i * meta.feature_len..(i + 1) * meta.feature_len].to_vec(),
                pi[i * meta.action_space..(i + 1) * meta.action_space].to_vec(),
                z[i],
            )
        })
        .collect();
    Ok(IterationBatch {
        iteration: meta.iteration,
        examples,
    })
}

fn f32_tensor(st: &SafeTensors<'_>, name: &str, shape: &[usize]) -> Result<Vec<f32>, String> {
    let t = st.tensor(name).map_err(|e| format!("{name}: {e}"))?;
    if t.dtype() != Dtype::F32 {
        return Err(format!("{name}: expected f32, got {:?}", t.dtype()));
    }
    if t.shape() != shape {
        return Err(format!("{name}: shape {:?}, expected {shape:?}", t.shape()));
    }
    Ok(t
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReplayError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Remove `*.tmp` leftovers of an interrupted write.
pub fn cleanup_tmp_files(dir: &Path) -> Result<(), ReplayError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let e = entry?;
        let p = e.path();
        if let Some(name) = p.file_name().and_then(|s| s.to_str()) {
            if name.ends_with(".tmp") && p.is_file() {
                let _ = fs::remove_file(&p);
            }
        }
    }
    Ok(())
}
