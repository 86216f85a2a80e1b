//! 로컬 파일 출력
//!
//! 파일을 한 번 열어(append/create) 번들마다 레코드를 한 줄씩 덧붙입니다.
//! `output.compress_data`가 켜져 있으면 번들마다 독립된 gzip 멤버를 씁니다.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::behavior::{Behavior, StatsHandle, UploadStatus, stream_bundle};
use crate::bundle::Bundle;
use crate::compress::{copy_gzip, copy_plain};
use crate::error::OutputError;
use crate::render::Renderer;

/// 파일 출력 behavior
pub struct FileBehavior {
    path: PathBuf,
    key: String,
    file: File,
    compress: bool,
    renderer: Arc<Renderer>,
    stats: StatsHandle,
}

impl FileBehavior {
    /// 대상 파일을 엽니다. 상위 디렉터리가 없으면 연결 에러입니다.
    pub async fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let path = PathBuf::from(destination);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            return Err(OutputError::connectivity(
                destination,
                format!("directory {} does not exist", parent.display()),
            ));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| OutputError::connectivity(destination, e))?;

        let stats = StatsHandle::new(destination, OutputKind::File);
        stats.stats().set_connected(true);

        Ok(Self {
            path,
            key: destination.to_owned(),
            file,
            compress: config.output.compress_data,
            renderer: Arc::new(Renderer::lines()),
            stats,
        })
    }
}

impl Behavior for FileBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        let suffix = if self.compress { " (gzip)" } else { "" };
        format!("file {}{suffix}", self.path.display())
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        let compress = self.compress;
        let file = &mut self.file;
        let result = stream_bundle(&self.renderer, name, bundle, |reader| async move {
            let mut reader = reader.into_async_read();
            let copied = if compress {
                copy_gzip(&mut reader, file).await
            } else {
                copy_plain(&mut reader, file).await
            };
            copied.map_err(OutputError::transmission)
        })
        .await;

        match result {
            Ok((bytes, summary)) => {
                self.stats.stats().record_upload(summary.records, bytes);
                UploadStatus::success(name, summary.records, bytes)
            }
            Err(err) => UploadStatus::failure(name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleBuffer, EventRecord};

    fn bundle(texts: &[&str]) -> Bundle {
        let mut buf = BundleBuffer::new("file");
        for text in texts {
            buf.push(EventRecord::new(text.to_string()));
        }
        buf.seal("b")
    }

    #[tokio::test]
    async fn writes_one_record_per_line_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let dest = path.display().to_string();
        let config = ForwarderConfig::default();

        let mut behavior = FileBehavior::initialize(&dest, &config).await.unwrap();
        assert!(behavior.upload("b1", &bundle(&["one", "two"])).await.is_success());
        assert!(behavior.upload("b2", &bundle(&["three"])).await.is_success());

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "one\ntwo\nthree\n");

        let stats = behavior.statistics();
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.records_sent, 3);
        assert_eq!(stats.bytes_sent, content.len() as u64);
    }

    #[tokio::test]
    async fn missing_parent_directory_is_connectivity_error() {
        let config = ForwarderConfig::default();
        let err = FileBehavior::initialize("/nonexistent/evfwd/events.log", &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OutputError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn describe_mentions_path() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.log").display().to_string();
        let behavior = FileBehavior::initialize(&dest, &ForwarderConfig::default())
            .await
            .unwrap();
        assert!(behavior.describe().contains("out.log"));
        assert_eq!(behavior.key(), dest);
    }
}
