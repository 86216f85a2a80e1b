//! UDP 데이터그램 출력
//!
//! 레코드 하나를 데이터그램 하나로 보냅니다. 전달 확인은 없으며 로컬 송신 에러만
//! 보고됩니다.

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;
use tokio::net::UdpSocket;

use crate::behavior::{Behavior, StatsHandle, UploadStatus};
use crate::bundle::Bundle;
use crate::error::OutputError;
use crate::net::split_host_port;

/// 목적지에 연결된 UDP 소켓을 엽니다.
pub(crate) async fn bind_connected(destination: &str, address: &str) -> Result<UdpSocket, OutputError> {
    let (host, port) = split_host_port(address)?;
    let target = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| OutputError::connectivity(destination, e))?
        .next()
        .ok_or_else(|| OutputError::connectivity(destination, "address did not resolve"))?;

    let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| OutputError::connectivity(destination, e))?;
    socket
        .connect(target)
        .await
        .map_err(|e| OutputError::connectivity(destination, e))?;
    Ok(socket)
}

/// 번들의 레코드를 데이터그램으로 보내고 (레코드 수, 바이트 수)를 반환합니다.
///
/// 각 데이터그램은 `prefix` + 레코드 원문입니다.
pub(crate) async fn send_datagrams(
    socket: &UdpSocket,
    bundle: &Bundle,
    prefix: &[u8],
) -> Result<(u64, u64), OutputError> {
    let mut datagram = Vec::new();
    let mut bytes = 0u64;
    for record in bundle.records() {
        datagram.clear();
        datagram.extend_from_slice(prefix);
        datagram.extend_from_slice(record.text());
        let sent = socket
            .send(&datagram)
            .await
            .map_err(OutputError::transmission)?;
        bytes += sent as u64;
    }
    Ok((bundle.len() as u64, bytes))
}

/// UDP 출력 behavior
pub struct UdpBehavior {
    key: String,
    socket: UdpSocket,
    stats: StatsHandle,
}

impl UdpBehavior {
    /// 목적지(`host:port`)에 연결된 소켓을 엽니다.
    pub async fn initialize(destination: &str, _config: &ForwarderConfig) -> Result<Self, OutputError> {
        let socket = bind_connected(destination, destination).await?;
        let stats = StatsHandle::new(destination, OutputKind::Udp);
        stats.stats().set_connected(true);
        Ok(Self {
            key: destination.to_owned(),
            socket,
            stats,
        })
    }
}

impl Behavior for UdpBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.key)
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        match send_datagrams(&self.socket, bundle, &[]).await {
            Ok((records, bytes)) => {
                self.stats.stats().record_upload(records, bytes);
                UploadStatus::success(name, records, bytes)
            }
            Err(err) => UploadStatus::failure(name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleBuffer, EventRecord};

    #[tokio::test]
    async fn sends_one_datagram_per_record() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = peer.local_addr().unwrap().to_string();
        let mut behavior = UdpBehavior::initialize(&dest, &ForwarderConfig::default())
            .await
            .unwrap();

        let mut buf = BundleBuffer::new(dest.clone());
        buf.push(EventRecord::new("first"));
        buf.push(EventRecord::new("second"));
        let status = behavior.upload("b1", &buf.seal("b1")).await;
        assert!(status.is_success());
        assert_eq!(status.records, 2);
        assert_eq!(status.bytes, 11);

        let mut recv = [0u8; 64];
        let n = peer.recv(&mut recv).await.unwrap();
        assert_eq!(&recv[..n], b"first");
        let n = peer.recv(&mut recv).await.unwrap();
        assert_eq!(&recv[..n], b"second");
    }

    #[tokio::test]
    async fn invalid_destination_is_configuration_error() {
        let err = UdpBehavior::initialize("no-port", &ForwarderConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OutputError::Configuration(_)));
    }
}
