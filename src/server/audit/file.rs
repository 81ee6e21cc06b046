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

//! File-based audit exporter writing JSON Lines.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use super::event::AuditEvent;
use super::exporter::AuditExporter;

/// Audit exporter that appends one JSON object per line.
///
/// Each record is serialized in full before the writer lock is taken and
/// written with a single `write_all`, so records from concurrent sessions
/// never interleave.
///
/// # Example
///
/// ```no_run
/// use sshadm::server::audit::FileExporter;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let exporter = FileExporter::new(Path::new("/var/log/sshadm/access.jsonl"))?;
/// # Ok(())
/// # }
/// ```
pub struct FileExporter {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileExporter {
    /// Open the audit file in append mode, creating it if needed.
    ///
    /// On Unix the file is created with mode 0o600 and missing parent
    /// directories with mode 0o700.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            #[cfg(unix)]
            {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o700)
                    .create(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            #[cfg(not(unix))]
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut options = std::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        let file = options
            .open(path)
            .with_context(|| format!("Failed to open audit file {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Audit file opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(File::from_std(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditExporter for FileExporter {
    async fn export(&self, event: AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn export_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let mut buf = String::new();
        for event in events {
            buf.push_str(&serde_json::to_string(event)?);
            buf.push('\n');
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(buf.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.get_mut().sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::audit::event::EventType;
    use crate::shared::endpoint::RemoteEndpoint;
    use std::sync::Arc;

    fn event(n: usize) -> AuditEvent {
        let remote = RemoteEndpoint::from_socket("10.1.1.1:40000".parse().unwrap());
        AuditEvent::new(EventType::Connect, format!("session-{n}"), &remote)
    }

    #[tokio::test]
    async fn test_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("access.jsonl");
        let exporter = FileExporter::new(&path).unwrap();

        exporter.export(event(1)).await.unwrap();
        exporter.export_batch(&[event(2), event(3)]).await.unwrap();
        exporter.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let parsed: AuditEvent = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.event_type, EventType::Connect);
        }
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.jsonl");

        FileExporter::new(&path).unwrap().export(event(1)).await.unwrap();
        FileExporter::new(&path).unwrap().export(event(2)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_exports_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.jsonl");
        let exporter = Arc::new(FileExporter::new(&path).unwrap());

        let mut tasks = Vec::new();
        for n in 0..50 {
            let exporter = Arc::clone(&exporter);
            tasks.push(tokio::spawn(async move { exporter.export(event(n)).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        exporter.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut ids: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<AuditEvent>(l).unwrap().session_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.jsonl");
        let _exporter = FileExporter::new(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
