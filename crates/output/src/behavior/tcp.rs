//! TCP 스트림 출력
//!
//! `initialize`에서 즉시 연결하고(`tls:` 접두어면 TLS), 번들마다 레코드를 한 줄씩
//! 스트리밍합니다. 전송 중 연결이 끊기면 핸들을 버리고 다음 업로드 전에 재연결합니다.

use std::sync::Arc;

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::behavior::{Behavior, StatsHandle, UploadStatus, stream_bundle_with};
use crate::bundle::Bundle;
use crate::compress::copy_plain;
use crate::error::OutputError;
use crate::net::{BoxedStream, StreamConnector};
use crate::render::{RenderContext, RenderSummary, Renderer};
use crate::tls::build_client_config;

/// 재연결 가능한 스트림 세션 (TCP, syslog over TCP)
pub(crate) struct StreamSession {
    connector: StreamConnector,
    stream: Option<BoxedStream>,
    stats: StatsHandle,
}

impl StreamSession {
    /// 즉시 연결된 세션을 엽니다.
    pub(crate) async fn open(connector: StreamConnector, stats: StatsHandle) -> Result<Self, OutputError> {
        let stream = connector.connect().await?;
        stats.stats().set_connected(true);
        Ok(Self {
            connector,
            stream: Some(stream),
            stats,
        })
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.connector.is_tls()
    }

    /// 번들을 렌더링해 연결에 씁니다. 실패하면 연결을 버립니다.
    pub(crate) async fn send(
        &mut self,
        renderer: &Arc<Renderer>,
        ctx: RenderContext,
        bundle: &Bundle,
    ) -> Result<(u64, RenderSummary), OutputError> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = self.connector.connect().await?;
                self.stats.stats().record_reconnect();
                self.stats.stats().set_connected(true);
                tracing::info!(destination = self.stats.destination(), "reconnected");
                stream
            }
        };

        let sink = &mut stream;
        let result = stream_bundle_with(renderer, ctx, bundle, |reader| async move {
            let mut reader = reader.into_async_read();
            copy_plain(&mut reader, sink)
                .await
                .map_err(OutputError::transmission)
        })
        .await;

        match result {
            Ok(sent) => {
                self.stream = Some(stream);
                Ok(sent)
            }
            Err(err) => {
                self.stats.stats().set_connected(false);
                Err(err)
            }
        }
    }
}

/// TCP 출력 behavior
pub struct TcpBehavior {
    key: String,
    session: StreamSession,
    renderer: Arc<Renderer>,
    stats: StatsHandle,
}

impl TcpBehavior {
    /// 목적지(`host:port` 또는 `tls:host:port`)에 연결합니다.
    pub async fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let (address, tls) = match destination.strip_prefix("tls:") {
            Some(address) => (address, Some(build_client_config(&config.output.tls)?)),
            None => (destination, None),
        };
        let connector = StreamConnector::new(destination, address, tls, config.connect_timeout())?;
        let stats = StatsHandle::new(destination, OutputKind::Tcp);
        let session = StreamSession::open(connector, stats.clone()).await?;

        Ok(Self {
            key: destination.to_owned(),
            session,
            renderer: Arc::new(Renderer::lines()),
            stats,
        })
    }
}

impl Behavior for TcpBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        let scheme = if self.session.is_tls() { "tcp+tls" } else { "tcp" };
        format!("{scheme}://{}", self.key.trim_start_matches("tls:"))
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        let ctx = RenderContext::new(name, bundle.byte_size());
        match self.session.send(&self.renderer, ctx, bundle).await {
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
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn bundle(texts: &[&str]) -> Bundle {
        let mut buf = BundleBuffer::new("tcp");
        for text in texts {
            buf.push(EventRecord::new(text.to_string()));
        }
        buf.seal("b")
    }

    #[tokio::test]
    async fn streams_lines_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest = listener.local_addr().unwrap().to_string();

        let mut behavior = TcpBehavior::initialize(&dest, &ForwarderConfig::default())
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();
        assert!(behavior.statistics().connected);

        let status = behavior.upload("b1", &bundle(&["alpha", "beta"])).await;
        assert!(status.is_success());
        assert_eq!(status.records, 2);
        drop(behavior);

        let mut got = String::new();
        peer.read_to_string(&mut got).await.unwrap();
        assert_eq!(got, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn initialize_fails_when_peer_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TcpBehavior::initialize(&dest, &ForwarderConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OutputError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn describe_shows_scheme() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dest = listener.local_addr().unwrap().to_string();
        let behavior = TcpBehavior::initialize(&dest, &ForwarderConfig::default())
            .await
            .unwrap();
        assert_eq!(behavior.describe(), format!("tcp://{dest}"));
    }
}
