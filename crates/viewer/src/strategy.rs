use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use uuid::Uuid;

use splatpipe_protocol::messages::{Message, RequestStreamingFallback};
use splatpipe_protocol::{Receiver, Sender};
use splatpipe_transfer::TransferError;
use splatpipe_transfer::tiers::{
    AUTO_STREAM_MAX, DIRECT_LOAD_THRESHOLD, TRANSFER_TIMEOUT, preferred_chunk_size,
};

use crate::ViewerError;
use crate::driver::{DownloadDriver, LoadedModel};
use crate::ready::ReadyWaiter;

/// What the loader knows about the file before choosing a strategy.
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub filename: String,
    pub file_size: u64,
    /// Set when the artifact is reachable on the viewer's own filesystem.
    pub local_path: Option<PathBuf>,
}

/// A boxed future returned by [`LoadStrategy::run`].
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<LoadedModel, ViewerError>> + Send + 'a>>;

/// One named way of obtaining the file.
///
/// Strategies are tried in list order; `applies` is the precondition and
/// `run` the attempt, with a uniform result contract so the loader never
/// nests ad hoc retries inside a strategy.
pub trait LoadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies(&self, plan: &FilePlan) -> bool;

    fn run<'a>(
        &'a self,
        plan: &'a FilePlan,
        sender: &'a Sender,
        receiver: &'a mut Receiver,
    ) -> LoadFuture<'a>;
}

/// Reads the artifact straight from the viewer's filesystem.
///
/// Only for payloads small enough to hold in one allocation; anything
/// larger goes through a streaming strategy.
pub struct DirectRead;

impl LoadStrategy for DirectRead {
    fn name(&self) -> &'static str {
        "directRead"
    }

    fn applies(&self, plan: &FilePlan) -> bool {
        plan.local_path.is_some() && plan.file_size <= DIRECT_LOAD_THRESHOLD
    }

    fn run<'a>(
        &'a self,
        plan: &'a FilePlan,
        _sender: &'a Sender,
        _receiver: &'a mut Receiver,
    ) -> LoadFuture<'a> {
        Box::pin(async move {
            // applies() guaranteed the path.
            let Some(path) = plan.local_path.as_ref() else {
                return Err(ViewerError::Io(std::io::Error::other("no local path")));
            };
            let bytes = tokio::fs::read(path).await?;
            if !splatpipe_ply::looks_like_ply(&bytes) {
                return Err(ViewerError::Transfer(TransferError::FormatValidationFailure));
            }
            Ok(LoadedModel {
                filename: plan.filename.clone(),
                bytes,
            })
        })
    }
}

/// Pull-mode chunk streaming.
///
/// The host announces `startStreaming` on its own for files in the band
/// above the direct-load threshold; the driver then requests chunks (or
/// batches) until the session assembles.
pub struct ChunkStreaming {
    timeout: Duration,
}

impl ChunkStreaming {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ChunkStreaming {
    fn default() -> Self {
        Self::new(TRANSFER_TIMEOUT)
    }
}

impl LoadStrategy for ChunkStreaming {
    fn name(&self) -> &'static str {
        "chunkStreaming"
    }

    fn applies(&self, plan: &FilePlan) -> bool {
        plan.file_size > DIRECT_LOAD_THRESHOLD && plan.file_size <= AUTO_STREAM_MAX
    }

    fn run<'a>(
        &'a self,
        plan: &'a FilePlan,
        sender: &'a Sender,
        receiver: &'a mut Receiver,
    ) -> LoadFuture<'a> {
        Box::pin(async move {
            let driver = DownloadDriver::with_timeout(sender.clone(), self.timeout);
            driver.run(receiver, &plan.filename).await
        })
    }
}

/// Last-resort legacy path: ask the host for a streaming fallback and
/// consume the push-mode base64 chunk stream it answers with.
pub struct LegacyChunked {
    timeout: Duration,
}

impl LegacyChunked {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LegacyChunked {
    fn default() -> Self {
        Self::new(TRANSFER_TIMEOUT)
    }
}

impl LoadStrategy for LegacyChunked {
    fn name(&self) -> &'static str {
        "legacyChunked"
    }

    fn applies(&self, _plan: &FilePlan) -> bool {
        true
    }

    fn run<'a>(
        &'a self,
        plan: &'a FilePlan,
        sender: &'a Sender,
        receiver: &'a mut Receiver,
    ) -> LoadFuture<'a> {
        Box::pin(async move {
            sender.send(Message::RequestStreamingFallback(RequestStreamingFallback {
                file_size: plan.file_size,
                chunk_size: Some(preferred_chunk_size(plan.file_size)),
                request_id: format!("streaming-fallback-{}", Uuid::new_v4()),
            }))?;
            let driver = DownloadDriver::with_timeout(sender.clone(), self.timeout);
            driver.run(receiver, &plan.filename).await
        })
    }
}

/// Tries an ordered list of load strategies and stops at the first
/// success.
pub struct Loader {
    strategies: Vec<Box<dyn LoadStrategy>>,
}

impl Default for Loader {
    /// The standard order: local read, pull-mode streaming, legacy push.
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(DirectRead),
            Box::new(ChunkStreaming::default()),
            Box::new(LegacyChunked::default()),
        ])
    }
}

impl Loader {
    pub fn with_strategies(strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        Self { strategies }
    }

    /// Obtains the file once the consumer is ready for it.
    ///
    /// Awaits `ready` first, then walks the strategy list: skip where the
    /// precondition fails, try where it holds, return the first success.
    /// Every failure is logged and carried into the final error when no
    /// strategy is left.
    pub async fn load(
        &self,
        plan: &FilePlan,
        sender: &Sender,
        receiver: &mut Receiver,
        ready: ReadyWaiter,
    ) -> Result<LoadedModel, ViewerError> {
        ready.wait().await?;

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            if !strategy.applies(plan) {
                tracing::debug!(strategy = strategy.name(), "precondition not met, skipping");
                continue;
            }
            tracing::info!(
                strategy = strategy.name(),
                filename = %plan.filename,
                file_size = plan.file_size,
                "trying load strategy"
            );
            match strategy.run(plan, sender, receiver).await {
                Ok(model) => return Ok(model),
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), "load strategy failed: {e}");
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }
        Err(ViewerError::AllStrategiesFailed(failures.join("; ")))
    }
}
