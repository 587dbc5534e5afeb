use crate::cache::input_fingerprint;
use crate::config::CHECKPOINT_VERSION;
use crate::stats::PipelineStats;
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which pipeline wrote the checkpoint. A pages checkpoint never resumes an
/// entities run and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineKind {
    Pages,
    Entities,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Pages => f.write_str("pages"),
            PipelineKind::Entities => f.write_str("entities"),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub input_path: String,
    pub input_mtime: u64,
    pub output_dir: String,
    pub kind: PipelineKind,
    /// Raw pages consumed when the checkpoint was taken
    pub pages_seen: u64,
    pub stats: PipelineStats,
}

pub fn checkpoint_path(output_dir: &str) -> PathBuf {
    Path::new(output_dir).join("checkpoint.bin")
}

fn input_mtime(input_path: &str) -> Result<u64> {
    input_fingerprint(input_path).map(|(mtime, _)| mtime)
}

pub fn load_if_valid(
    input_path: &str,
    output_dir: &str,
    kind: PipelineKind,
) -> Result<Option<Checkpoint>> {
    let path = checkpoint_path(output_dir);

    if !path.exists() {
        return Ok(None);
    }

    let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    let file = File::open(&path).context("Failed to open checkpoint file")?;
    let reader = BufReader::new(file);

    let options = bincode::options().with_limit(file_size.saturating_add(1024));

    let checkpoint: Checkpoint = match options.deserialize_from(reader) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Checkpoint file is corrupt or unreadable");
            return Ok(None);
        }
    };

    if checkpoint.version != CHECKPOINT_VERSION {
        info!(
            cached = checkpoint.version,
            current = CHECKPOINT_VERSION,
            "Checkpoint version mismatch"
        );
        return Ok(None);
    }

    if checkpoint.kind != kind {
        info!(
            cached = %checkpoint.kind,
            current = %kind,
            "Checkpoint belongs to another pipeline"
        );
        return Ok(None);
    }

    if checkpoint.input_path != input_path {
        info!(
            cached = checkpoint.input_path,
            current = input_path,
            "Checkpoint input path mismatch"
        );
        return Ok(None);
    }

    let current_mtime = input_mtime(input_path)?;
    if checkpoint.input_mtime != current_mtime {
        info!(
            cached_mtime = checkpoint.input_mtime,
            current_mtime = current_mtime,
            "Input file has changed since checkpoint was created"
        );
        return Ok(None);
    }

    if checkpoint.output_dir != output_dir {
        info!(
            cached = checkpoint.output_dir,
            current = output_dir,
            "Checkpoint output directory mismatch"
        );
        return Ok(None);
    }

    info!(
        pages = checkpoint.pages_seen,
        emitted = checkpoint.stats.emitted,
        "Loaded valid checkpoint"
    );

    Ok(Some(checkpoint))
}

pub fn clear(output_dir: &str) -> Result<()> {
    let path = checkpoint_path(output_dir);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove checkpoint file: {:?}", path))?;
        info!("Checkpoint cleared");
    }
    Ok(())
}

/// Saves checkpoints for one run. The driver calls [`save`](Self::save)
/// right after each successful sink flush.
pub struct CheckpointManager {
    checkpoint_path: PathBuf,
    input_path: String,
    input_mtime: u64,
    output_dir: String,
    kind: PipelineKind,
}

impl CheckpointManager {
    pub fn new(input_path: &str, output_dir: &str, kind: PipelineKind) -> Result<Self> {
        let input_mtime = input_mtime(input_path)?;
        Ok(Self {
            checkpoint_path: checkpoint_path(output_dir),
            input_path: input_path.to_string(),
            input_mtime,
            output_dir: output_dir.to_string(),
            kind,
        })
    }

    pub fn save(&self, pages_seen: u64, stats: &PipelineStats) -> Result<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            input_path: self.input_path.clone(),
            input_mtime: self.input_mtime,
            output_dir: self.output_dir.clone(),
            kind: self.kind,
            pages_seen,
            stats: stats.clone(),
        };

        if let Some(parent) = self.checkpoint_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let tmp_path = self.checkpoint_path.with_extension("bin.tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp checkpoint file: {:?}", tmp_path))?;
        let writer = BufWriter::new(file);

        bincode::DefaultOptions::new()
            .serialize_into(writer, &checkpoint)
            .context("Failed to serialize checkpoint")?;

        fs::rename(&tmp_path, &self.checkpoint_path).with_context(|| {
            format!(
                "Failed to rename temp checkpoint: {:?}",
                self.checkpoint_path
            )
        })?;

        debug!(
            pages = pages_seen,
            emitted = stats.emitted,
            "Checkpoint saved"
        );

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        clear(&self.output_dir)
    }
}
