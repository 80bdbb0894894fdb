use async_trait::async_trait;
use log::{error, warn};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::modbus::events::{LogChannel, LogEvent};
use crate::utils::error::TransportError;

/// Receives log events produced by the master.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError>;
    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError> {
        println!("{}", event);
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends events to a text file, optionally only one channel.
pub struct FileSink {
    path: PathBuf,
    display: String,
    channel: Option<LogChannel>,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P, channel: Option<LogChannel>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            display: path.as_ref().to_string_lossy().to_string(),
            channel,
        }
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn send(&self, event: &LogEvent) -> Result<(), TransportError> {
        if self.channel.is_some_and(|c| c != event.channel) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                error!("❌ Failed to open log file {}: {}", self.display, e);
                TransportError::from(e)
            })?;

        let line = format!(
            "{} [{}] {}\n",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.channel,
            event.message
        );
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.display
    }
}

/// Forwards every event to all sinks until the master (the last sender) is
/// dropped.
pub fn spawn_event_pump(
    mut receiver: broadcast::Receiver<LogEvent>,
    sinks: Vec<Box<dyn EventSink>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    for sink in &sinks {
                        if let Err(e) = sink.send(&event).await {
                            error!(
                                "❌ Failed to deliver event via {} to {}: {}",
                                sink.sink_type(),
                                sink.destination(),
                                e
                            );
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠ Event pump lagged, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
