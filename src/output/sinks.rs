//! Item sink implementations
//!
//! - [`JsonLinesSink`] appends one JSON object per line to a file
//! - [`MemorySink`] collects items in memory

use crate::extract::Item;
use crate::output::traits::{Sink, SinkResult};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Writes items as JSON lines
///
/// Writes are buffered; [`Sink::flush`] pushes them to disk.
pub struct JsonLinesSink {
    writer: tokio::sync::Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Creates the file, truncating any previous content
    pub async fn create(path: &Path) -> SinkResult<Self> {
        let file = File::create(path).await?;
        Ok(Self::from_file(file))
    }

    /// Opens the file for appending, creating it if missing
    ///
    /// Used when resuming, so items from earlier runs are kept.
    pub async fn append(path: &Path) -> SinkResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: File) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
        }
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn emit(&self, item: Item) -> SinkResult<()> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

/// Keeps every emitted item in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<Item>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the items received so far, in arrival order
    pub fn items(&self) -> Vec<Item> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn emit(&self, item: Item) -> SinkResult<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
        Ok(())
    }
}
