// src/pipeline/generate.rs

//! Document generation: stored rows -> converter workers -> chunk files.
//!
//! ```text
//! RowSource --rows--> [converter x N] --documents--> ChunkWriter
//! ```
//!
//! Both channels hold `chunk_size` items. The first stage failure cancels
//! every other stage, and `generate` returns only after all of them stopped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::builder::DocumentBuilder;
use super::chunk::{ChunkSummary, ChunkWriter};
use crate::error::{AppError, Result};
use crate::storage::RowFilter;

/// Streams stored rows matching `filter` into `tx`.
///
/// Implementations must return (dropping `tx`, which closes the channel) when
/// rows are exhausted, on error, and as soon as `token` is cancelled.
#[async_trait]
pub trait RowSource<R: Send + 'static>: Send + Sync {
    async fn read_rows(
        &self,
        filter: &RowFilter,
        token: CancellationToken,
        tx: mpsc::Sender<R>,
    ) -> Result<usize>;
}

/// Counts from a completed generation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerateSummary {
    pub rows: usize,
    /// Documents built by the converters
    pub converted: usize,
    /// Documents written to chunk files
    pub documents: usize,
    pub chunks: usize,
}

enum StageOutput {
    Read(usize),
    Converted(usize),
    Written(ChunkSummary),
}

/// Run one generation.
///
/// Returns the first stage error, or `Interrupted` if `token` was cancelled
/// from outside while the stages were running.
pub async fn generate<R, B>(
    token: &CancellationToken,
    source: Arc<dyn RowSource<R>>,
    filter: RowFilter,
    builder: Arc<B>,
    writer: ChunkWriter,
    concurrency: usize,
) -> Result<GenerateSummary>
where
    R: Send + 'static,
    B: DocumentBuilder<Row = R> + 'static,
{
    let token = token.child_token();
    let capacity = writer.chunk_size();
    let (row_tx, row_rx) = mpsc::channel::<R>(capacity);
    let (doc_tx, doc_rx) = mpsc::channel::<B::Document>(capacity);

    log::info!(
        "Generating documents into {} (chunk size {}, {} converters)",
        writer.save_dir().display(),
        capacity,
        concurrency.max(1)
    );

    let mut stages: JoinSet<Result<StageOutput>> = JoinSet::new();
    {
        let token = token.clone();
        stages.spawn(async move {
            // the row channel must not close on a failed read before the run is cancelled
            let keep_open = row_tx.clone();
            let read = source.read_rows(&filter, token.clone(), row_tx).await;
            if read.is_err() {
                token.cancel();
            }
            drop(keep_open);
            Ok(StageOutput::Read(read?))
        });
    }
    {
        let token = token.clone();
        stages.spawn(async move {
            let converted = convert(token, builder, row_rx, doc_tx, concurrency).await?;
            Ok(StageOutput::Converted(converted))
        });
    }
    {
        let token = token.clone();
        stages.spawn(async move {
            let written = writer.write(&token, doc_rx).await?;
            Ok(StageOutput::Written(written))
        });
    }

    let mut summary = GenerateSummary::default();
    let first_error = join_stages(&token, &mut stages, |output| match output {
        StageOutput::Read(rows) => summary.rows = rows,
        StageOutput::Converted(documents) => summary.converted = documents,
        StageOutput::Written(written) => {
            summary.documents = written.documents;
            summary.chunks = written.chunks;
        }
    })
    .await;

    if let Some(error) = first_error {
        log::error!("Generation failed: {}", error);
        return Err(error);
    }
    if token.is_cancelled() {
        log::warn!("Generation interrupted");
        return Err(AppError::Interrupted);
    }

    log::info!(
        "Generated {} documents from {} rows in {} chunks",
        summary.documents,
        summary.rows,
        summary.chunks
    );
    Ok(summary)
}

/// Join every task in `set`, cancelling `token` on the first failure.
///
/// `Interrupted` results only cancel; they are not reported as the error.
pub(crate) async fn join_stages<T: 'static>(
    token: &CancellationToken,
    set: &mut JoinSet<Result<T>>,
    mut on_success: impl FnMut(T),
) -> Option<AppError> {
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined.map_err(AppError::from).and_then(|result| result) {
            Ok(output) => on_success(output),
            Err(error) => {
                token.cancel();
                if !error.is_interrupted() && first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }
    first_error
}

/// Converter pool. The document channel closes when the last worker returns.
async fn convert<B: DocumentBuilder + 'static>(
    token: CancellationToken,
    builder: Arc<B>,
    rows: mpsc::Receiver<B::Row>,
    documents: mpsc::Sender<B::Document>,
    concurrency: usize,
) -> Result<usize> {
    let rows = Arc::new(Mutex::new(rows));
    let mut workers = JoinSet::new();
    for id in 0..concurrency.max(1) {
        let token = token.clone();
        let builder = Arc::clone(&builder);
        let rows = Arc::clone(&rows);
        let documents = documents.clone();
        workers.spawn(async move { convert_worker(id, token, builder, rows, documents).await });
    }

    // `documents` is held until every worker stopped and a failure has
    // cancelled `token`, so the writer never mistakes a failed run for a
    // finished one.
    let mut converted = 0;
    let first_error = join_stages(&token, &mut workers, |n| converted += n).await;
    drop(documents);
    match first_error {
        Some(error) => Err(error),
        None => Ok(converted),
    }
}

async fn convert_worker<B: DocumentBuilder>(
    id: usize,
    token: CancellationToken,
    builder: Arc<B>,
    rows: Arc<Mutex<mpsc::Receiver<B::Row>>>,
    documents: mpsc::Sender<B::Document>,
) -> Result<usize> {
    let mut converted = 0;
    loop {
        if token.is_cancelled() {
            break;
        }
        let row = {
            let mut rows = rows.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                row = rows.recv() => row,
            }
        };
        let Some(row) = row else { break };
        if token.is_cancelled() {
            break;
        }

        let document = builder.build(row)?;
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = documents.send(document) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        converted += 1;
    }
    log::debug!("Converter {} stopped after {} documents", id, converted);
    Ok(converted)
}
