// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Audit event exporters.
//!
//! This module defines the trait that all audit exporters implement, along
//! with the built-in exporters:
//!
//! - [`NullExporter`]: discards everything
//! - [`MemoryExporter`]: keeps events in memory for inspection

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::event::{AuditEvent, EventType};

/// Trait for audit log exporters.
///
/// Exporters must be thread-safe. Each call to [`export`](Self::export)
/// must write its record as a unit so that concurrent exports never
/// interleave fields of different records.
#[async_trait]
pub trait AuditExporter: Send + Sync {
    /// Export a single audit event.
    async fn export(&self, event: AuditEvent) -> Result<()>;

    /// Export multiple events in a batch.
    ///
    /// The default implementation calls `export()` for each event.
    async fn export_batch(&self, events: &[AuditEvent]) -> Result<()> {
        for event in events {
            self.export(event.clone()).await?;
        }
        Ok(())
    }

    /// Flush any buffered events.
    async fn flush(&self) -> Result<()>;

    /// Close the exporter and release resources.
    async fn close(&self) -> Result<()>;
}

/// Null exporter that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NullExporter;

impl NullExporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditExporter for NullExporter {
    async fn export(&self, _event: AuditEvent) -> Result<()> {
        Ok(())
    }

    async fn export_batch(&self, _events: &[AuditEvent]) -> Result<()> {
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Exporter that collects events in memory.
///
/// Clones share the same storage, so a clone can be handed to the auditor
/// while the original is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryExporter {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events exported so far.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    /// Events of one type, in export order.
    pub async fn events_of(&self, event_type: EventType) -> Vec<AuditEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditExporter for MemoryExporter {
    async fn export(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
