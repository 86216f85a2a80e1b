//! 스트림 소켓 연결 -- TCP와 syslog(tcp, tcp+tls)가 공유합니다.

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::OutputError;

/// 연결된 쓰기 스트림 (평문 TCP 또는 TLS)
pub type BoxedStream = Box<dyn AsyncWrite + Send + Unpin>;

/// `host:port` 문자열을 분리합니다. IPv6는 `[::1]:514` 형식입니다.
pub fn split_host_port(addr: &str) -> Result<(String, u16), OutputError> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
        OutputError::Configuration(format!("expected host:port, got '{addr}'"))
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(OutputError::Configuration(format!(
            "missing host in '{addr}'"
        )));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| OutputError::Configuration(format!("invalid port in '{addr}': {e}")))?;
    Ok((host.to_owned(), port))
}

/// 재연결 가능한 스트림 연결기
pub struct StreamConnector {
    destination: String,
    host: String,
    port: u16,
    tls: Option<(TlsConnector, ServerName<'static>)>,
    connect_timeout: Duration,
}

impl StreamConnector {
    /// 새 연결기를 생성합니다. `tls`가 있으면 연결 후 TLS 핸드셰이크를 수행합니다.
    pub fn new(
        destination: &str,
        address: &str,
        tls: Option<Arc<ClientConfig>>,
        connect_timeout: Duration,
    ) -> Result<Self, OutputError> {
        let (host, port) = split_host_port(address)?;
        let tls = match tls {
            Some(config) => {
                let name = ServerName::try_from(host.clone()).map_err(|e| {
                    OutputError::Configuration(format!("invalid tls host '{host}': {e}"))
                })?;
                Some((TlsConnector::from(config), name))
            }
            None => None,
        };
        Ok(Self {
            destination: destination.to_owned(),
            host,
            port,
            tls,
            connect_timeout,
        })
    }

    /// TLS 사용 여부
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// 새 연결을 엽니다.
    pub async fn connect(&self) -> Result<BoxedStream, OutputError> {
        let tcp = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| OutputError::connectivity(&self.destination, "connect timed out"))?
        .map_err(|e| OutputError::connectivity(&self.destination, e))?;
        let _ = tcp.set_nodelay(true);

        match &self.tls {
            None => Ok(Box::new(tcp)),
            Some((connector, name)) => {
                let stream =
                    tokio::time::timeout(self.connect_timeout, connector.connect(name.clone(), tcp))
                        .await
                        .map_err(|_| {
                            OutputError::connectivity(&self.destination, "tls handshake timed out")
                        })?
                        .map_err(|e| {
                            OutputError::connectivity(
                                &self.destination,
                                format!("tls handshake failed: {e}"),
                            )
                        })?;
                Ok(Box::new(stream))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn split_host_port_variants() {
        assert_eq!(
            split_host_port("collector:514").unwrap(),
            ("collector".to_owned(), 514)
        );
        assert_eq!(split_host_port("[::1]:6514").unwrap(), ("::1".to_owned(), 6514));
        assert!(split_host_port("collector").is_err());
        assert!(split_host_port(":514").is_err());
        assert!(split_host_port("collector:http").is_err());
    }

    #[tokio::test]
    async fn connects_to_plain_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let connector = StreamConnector::new("tcp", &addr, None, Duration::from_secs(5)).unwrap();
        assert!(!connector.is_tls());

        let mut stream = connector.connect().await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        stream.shutdown().await.unwrap();

        let (mut peer, _) = listener.accept().await.unwrap();
        let mut got = String::new();
        peer.read_to_string(&mut got).await.unwrap();
        assert_eq!(got, "hello");
    }

    #[tokio::test]
    async fn refused_connection_is_connectivity_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = StreamConnector::new("tcp", &addr, None, Duration::from_secs(5)).unwrap();
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, OutputError::Connectivity { .. }));
    }
}
