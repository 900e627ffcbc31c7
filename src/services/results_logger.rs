use std::sync::Arc;

use reqwest::Client as HttpClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, AppResult},
    models::EventRecord,
};

/// Destination for study event records
#[async_trait::async_trait]
pub trait EventWriter: Send + Sync {
    async fn write(&self, record: &EventRecord) -> AppResult<()>;

    /// Writer name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Appends records as rows of a spreadsheet behind a JSON endpoint
pub struct SheetWriter {
    http_client: HttpClient,
    endpoint: String,
}

impl SheetWriter {
    pub fn new(endpoint: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl EventWriter for SheetWriter {
    async fn write(&self, record: &EventRecord) -> AppResult<()> {
        let response = self.http_client.post(&self.endpoint).json(record).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Results sheet returned status {}: {}",
                status, body
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "sheet"
    }
}

/// Emits records to the tracing output only
pub struct TraceWriter;

#[async_trait::async_trait]
impl EventWriter for TraceWriter {
    async fn write(&self, record: &EventRecord) -> AppResult<()> {
        tracing::info!(
            participant_id = %record.participant_id,
            group = %record.group,
            event_type = ?record.event_type,
            movie_id = %record.movie_id,
            genre = %record.genre,
            "Study event"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "trace"
    }
}

/// Fire-and-forget sink for study events
///
/// Records are queued on a channel and written by a background task, so the
/// selection flow never waits on (or fails because of) the results sheet.
#[derive(Clone)]
pub struct ResultsLogger {
    write_tx: mpsc::UnboundedSender<EventRecord>,
}

/// Handle for gracefully shutting down the results writer
pub struct ResultsLoggerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ResultsLoggerHandle {
    /// Signals the writer task and waits until queued records are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Results writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Results writer task join error");
        }
    }
}

impl ResultsLogger {
    /// Creates a logger and spawns its background writer task
    pub fn new(writer: Arc<dyn EventWriter>) -> (Self, ResultsLoggerHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            Self::writer_task(writer, write_rx, shutdown_rx).await;
        });

        (Self { write_tx }, ResultsLoggerHandle { shutdown_tx, task })
    }

    async fn writer_task(
        writer: Arc<dyn EventWriter>,
        mut write_rx: mpsc::UnboundedReceiver<EventRecord>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(writer = writer.name(), "Results writer task started");

        loop {
            tokio::select! {
                Some(record) = write_rx.recv() => {
                    Self::write_record(writer.as_ref(), &record).await;
                }
                _ = shutdown_rx.recv() => {
                    // Senders live on in sessions, so drain without waiting for close
                    let mut flushed = 0;
                    while let Ok(record) = write_rx.try_recv() {
                        Self::write_record(writer.as_ref(), &record).await;
                        flushed += 1;
                    }

                    tracing::info!(flushed, "Results writer task stopped");
                    break;
                }
                else => break,
            }
        }
    }

    async fn write_record(writer: &dyn EventWriter, record: &EventRecord) {
        if let Err(e) = writer.write(record).await {
            tracing::error!(
                writer = writer.name(),
                participant_id = %record.participant_id,
                event_type = ?record.event_type,
                error = %e,
                "Failed to log study event"
            );
        }
    }

    /// Queues a record without waiting for it to be written
    pub fn log(&self, record: EventRecord) {
        if let Err(e) = self.write_tx.send(record) {
            tracing::error!(error = %e, "Failed to queue study event");
        }
    }
}
