//! Batch conversion: run many requests, emit results as they complete.
//!
//! Each request is independent; the only thing they share is the
//! orchestrator, which holds no per-request state. At most `concurrency`
//! requests are in flight. Results arrive in completion order, tagged with
//! the index of the request they belong to.

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_stream::Stream;
use tracing::info;

use crate::document::ConversionRequest;
use crate::error::ConvertError;
use crate::orchestrator::ConversionOrchestrator;
use crate::output::ConvertResponse;

/// One finished request: its index in the input and its outcome.
pub type BatchItem = (usize, Result<ConvertResponse, ConvertError>);

/// A boxed stream of batch results.
pub type ConversionStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Convert `requests` with bounded concurrency, streaming results as they
/// are ready.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use multitool_convert::{convert_stream, ConversionConfig, ConversionOrchestrator};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let orchestrator = Arc::new(ConversionOrchestrator::new(ConversionConfig::default())?);
/// let mut results = convert_stream(orchestrator, Vec::new(), 4);
/// while let Some((index, result)) = results.next().await {
///     match result {
///         Ok(r) => println!("#{index}: {} ({} bytes)", r.output_filename, r.bytes.len()),
///         Err(e) => eprintln!("#{index}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(
    orchestrator: Arc<ConversionOrchestrator>,
    requests: Vec<ConversionRequest>,
    concurrency: usize,
) -> ConversionStream {
    let concurrency = concurrency.max(1);
    info!(requests = requests.len(), concurrency, "Starting batch conversion");

    let s = stream::iter(requests.into_iter().enumerate().map(move |(index, request)| {
        let orchestrator = Arc::clone(&orchestrator);
        async move { (index, orchestrator.convert(request).await) }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

/// Convert every request and return the outcomes in input order.
pub async fn convert_all(
    orchestrator: Arc<ConversionOrchestrator>,
    requests: Vec<ConversionRequest>,
    concurrency: usize,
) -> Vec<Result<ConvertResponse, ConvertError>> {
    let mut items: Vec<BatchItem> = convert_stream(orchestrator, requests, concurrency).collect().await;
    items.sort_by_key(|(index, _)| *index);
    items.into_iter().map(|(_, r)| r).collect()
}
