//! syslog 출력
//!
//! 레코드마다 `<PRI>TIMESTAMP HOSTNAME TAG[PID]: ` 헤더를 붙입니다.
//! PRI는 user.info(14), TIMESTAMP는 RFC 3339, HOSTNAME은 `general.server_name`입니다.
//!
//! | 목적지 | 전송 |
//! |---|---|
//! | `udp:host:port` | 레코드당 데이터그램 하나 |
//! | `tcp:host:port` | 줄 단위 스트림 |
//! | `tcp+tls:host:port` | TLS 위 줄 단위 스트림 |

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::net::UdpSocket;

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::behavior::tcp::StreamSession;
use crate::behavior::udp::{bind_connected, send_datagrams};
use crate::behavior::{Behavior, StatsHandle, UploadStatus};
use crate::bundle::Bundle;
use crate::error::OutputError;
use crate::net::StreamConnector;
use crate::render::{RenderContext, Renderer};
use crate::tls::build_client_config;

/// user.info
const SYSLOG_PRIORITY: u8 = 14;
const SYSLOG_TAG: &str = "evfwd";

enum Transport {
    Udp(UdpSocket),
    /// 헤더는 업로드마다 [`RenderContext`]로 전달
    Stream(StreamSession, Arc<Renderer>),
}

/// syslog 출력 behavior
pub struct SyslogBehavior {
    key: String,
    protocol: &'static str,
    transport: Transport,
    hostname: String,
    pid: u32,
    stats: StatsHandle,
}

impl SyslogBehavior {
    /// 목적지 접두어에 맞는 전송을 엽니다.
    pub async fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let stats = StatsHandle::new(destination, OutputKind::Syslog);
        let timeout = config.connect_timeout();

        let (protocol, transport) = if let Some(address) = destination.strip_prefix("udp:") {
            let socket = bind_connected(destination, address).await?;
            stats.stats().set_connected(true);
            ("udp", Transport::Udp(socket))
        } else if let Some(address) = destination.strip_prefix("tcp+tls:") {
            let tls = build_client_config(&config.output.tls)?;
            let connector = StreamConnector::new(destination, address, Some(tls), timeout)?;
            let session = StreamSession::open(connector, stats.clone()).await?;
            ("tcp+tls", Transport::Stream(session, Arc::new(Renderer::lines())))
        } else if let Some(address) = destination.strip_prefix("tcp:") {
            let connector = StreamConnector::new(destination, address, None, timeout)?;
            let session = StreamSession::open(connector, stats.clone()).await?;
            ("tcp", Transport::Stream(session, Arc::new(Renderer::lines())))
        } else {
            return Err(OutputError::Configuration(format!(
                "syslog destination '{destination}' must start with udp:, tcp: or tcp+tls:"
            )));
        };

        Ok(Self {
            key: destination.to_owned(),
            protocol,
            transport,
            hostname: config.general.server_name.clone(),
            pid: std::process::id(),
            stats,
        })
    }

    /// 현재 시각의 레코드 헤더
    fn header(&self) -> String {
        format!(
            "<{SYSLOG_PRIORITY}>{} {} {SYSLOG_TAG}[{}]: ",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            self.hostname,
            self.pid
        )
    }
}

impl Behavior for SyslogBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        let address = self.key.split_once(':').map_or("", |(_, rest)| rest);
        format!("syslog+{}://{address}", self.protocol)
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        let header = self.header();
        let result = match &mut self.transport {
            Transport::Udp(socket) => send_datagrams(socket, bundle, header.as_bytes()).await,
            Transport::Stream(session, renderer) => {
                let ctx = RenderContext::new(name, bundle.byte_size()).with_record_prefix(header);
                session
                    .send(renderer, ctx, bundle)
                    .await
                    .map(|(bytes, summary)| (summary.records, bytes))
            }
        };

        match result {
            Ok((records, bytes)) => {
                self.stats.stats().record_upload(records, bytes);
                UploadStatus::success(name, records, bytes)
            }
            Err(err) => UploadStatus::failure(name, err),
        }
    }
}
