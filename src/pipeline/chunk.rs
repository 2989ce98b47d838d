// src/pipeline/chunk.rs

//! Chunk files: fixed-size JSON arrays of documents named `doc-<n>.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Counts reported by [`ChunkWriter::write`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSummary {
    pub chunks: usize,
    pub documents: usize,
}

/// Single consumer of the document channel.
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    save_dir: PathBuf,
    chunk_size: usize,
}

impl ChunkWriter {
    pub fn new(save_dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            save_dir: save_dir.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Create the save directory and remove chunk files left by an earlier run.
    pub async fn prepare(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.save_dir).await?;
        let stale = list_chunks(&self.save_dir).await?;
        for path in &stale {
            tokio::fs::remove_file(path).await?;
        }
        if !stale.is_empty() {
            log::info!(
                "Removed {} stale chunk files from {}",
                stale.len(),
                self.save_dir.display()
            );
        }
        Ok(stale.len())
    }

    /// Drain `documents` into chunk files numbered from 1.
    ///
    /// A partial chunk is flushed when the channel closes normally. When
    /// `token` is cancelled the buffered documents are dropped instead.
    pub async fn write<D: Serialize>(
        &self,
        token: &CancellationToken,
        mut documents: mpsc::Receiver<D>,
    ) -> Result<ChunkSummary> {
        let mut summary = ChunkSummary::default();
        let mut buffer: Vec<D> = Vec::with_capacity(self.chunk_size);

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                doc = documents.recv() => doc,
            };
            let Some(doc) = next else { break };

            buffer.push(doc);
            if buffer.len() >= self.chunk_size {
                self.flush(&mut summary, &mut buffer).await?;
            }
        }

        if token.is_cancelled() {
            if !buffer.is_empty() {
                log::warn!(
                    "Cancelled with {} documents buffered; partial chunk not written",
                    buffer.len()
                );
            }
            return Ok(summary);
        }

        if !buffer.is_empty() {
            self.flush(&mut summary, &mut buffer).await?;
        }
        log::info!(
            "Wrote {} documents in {} chunks to {}",
            summary.documents,
            summary.chunks,
            self.save_dir.display()
        );
        Ok(summary)
    }

    async fn flush<D: Serialize>(&self, summary: &mut ChunkSummary, buffer: &mut Vec<D>) -> Result<()> {
        let sequence = summary.chunks + 1;
        let path = chunk_path(&self.save_dir, sequence);
        let bytes = serde_json::to_vec(&*buffer)?;

        // write to temp, then rename
        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("Wrote chunk {} ({} documents)", path.display(), buffer.len());
        summary.chunks = sequence;
        summary.documents += buffer.len();
        buffer.clear();
        Ok(())
    }
}

pub fn chunk_path(dir: &Path, sequence: usize) -> PathBuf {
    dir.join(format!("doc-{sequence}.json"))
}

/// Sequence number of a chunk file name.
fn chunk_sequence(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("doc-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
        .filter(|n| *n > 0)
}

/// Chunk files in `dir`, ordered by sequence number. A missing directory has none.
pub async fn list_chunks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut chunks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(sequence) = chunk_sequence(&path) {
            chunks.push((sequence, path));
        }
    }
    chunks.sort_by_key(|(sequence, _)| *sequence);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}
