//! 목적지 behavior -- 출력 유형별 연결/업로드/상태 보고
//!
//! 모든 출력 유형은 [`Behavior`] trait을 구현하고, [`Destination`]이 여덟 가지
//! 구현을 하나의 닫힌 enum으로 묶습니다. 설정의 `output.kind`에 따라
//! [`Destination::initialize`]가 알맞은 variant를 생성합니다.
//!
//! # 업로드 계약
//! - `upload`는 절대 에러를 전파하지 않습니다. 모든 결과는 [`UploadStatus`]에 담깁니다.
//! - 같은 목적지에 대한 `upload`는 전달 워커 하나가 순차 호출합니다 (`&mut self`).
//! - 통계는 atomic 카운터이며 보고 경로에서 동시에 읽을 수 있습니다.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::bundle::Bundle;
use crate::error::OutputError;
use crate::pipe::{DEFAULT_PIPE_CAPACITY, PipeReader};
use crate::render::{RenderContext, RenderSummary, Renderer, finish, spawn_renderer};

pub mod file;
pub mod hec;
pub mod http;
pub mod kafka;
pub mod s3;
pub mod syslog;
pub mod tcp;
pub mod udp;

pub use file::FileBehavior;
pub use hec::HecBehavior;
pub use http::HttpBehavior;
pub use kafka::{KafkaBehavior, QueueProducer, QueueReceipt};
pub use s3::{ObjectStoreClient, PutObject, S3Behavior};
pub use syslog::SyslogBehavior;
pub use tcp::TcpBehavior;
pub use udp::UdpBehavior;

/// 목적지 behavior 공통 계약
pub trait Behavior: Send {
    /// 목적지 식별자 (메트릭 레이블, 통계 키)
    fn key(&self) -> &str;

    /// 운영자용 한 줄 설명
    fn describe(&self) -> String;

    /// 동시에 읽을 수 있는 통계 핸들
    fn stats_handle(&self) -> StatsHandle;

    /// 통계 스냅샷
    fn statistics(&self) -> BehaviorStatistics {
        self.stats_handle().snapshot()
    }

    /// 봉인된 번들 하나를 전송합니다.
    fn upload(&mut self, name: &str, bundle: &Bundle) -> impl Future<Output = UploadStatus> + Send;
}

// ─── 업로드 결과 ───────────────────────────────────────────────────

/// 업로드 시도 한 번의 결과
#[derive(Debug)]
pub struct UploadStatus {
    /// 번들 이름
    pub file_name: String,
    /// 성공 200, 전송 에러 0, HTTP 응답은 실제 상태 코드
    pub status: u16,
    /// 실패 원인
    pub error: Option<OutputError>,
    /// 전송된 레코드 수
    pub records: u64,
    /// 전송된 바이트 수
    pub bytes: u64,
}

impl UploadStatus {
    /// 성공 상태 코드
    pub const SUCCESS: u16 = 200;

    /// 성공 결과를 생성합니다.
    pub fn success(file_name: impl Into<String>, records: u64, bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            status: Self::SUCCESS,
            error: None,
            records,
            bytes,
        }
    }

    /// 실패 결과를 생성합니다. 상태 코드는 에러에서 가져옵니다.
    pub fn failure(file_name: impl Into<String>, error: OutputError) -> Self {
        Self {
            file_name: file_name.into(),
            status: error.status_code(),
            error: Some(error),
            records: 0,
            bytes: 0,
        }
    }

    /// 성공 여부
    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS && self.error.is_none()
    }

    /// 실패 상세 문자열
    pub fn detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

// ─── 통계 ──────────────────────────────────────────────────────────

const NO_POSITION: i64 = -1;

/// 전송 계층 카운터
#[derive(Debug)]
pub struct TransportStats {
    uploads: AtomicU64,
    records_sent: AtomicU64,
    bytes_sent: AtomicU64,
    connected: AtomicBool,
    reconnects: AtomicU64,
    last_partition: AtomicI64,
    last_offset: AtomicI64,
    last_object: Mutex<Option<String>>,
}

impl Default for TransportStats {
    fn default() -> Self {
        Self {
            uploads: AtomicU64::new(0),
            records_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            reconnects: AtomicU64::new(0),
            last_partition: AtomicI64::new(NO_POSITION),
            last_offset: AtomicI64::new(NO_POSITION),
            last_object: Mutex::new(None),
        }
    }
}

impl TransportStats {
    pub(crate) fn record_upload(&self, records: u64, bytes: u64) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.records_sent.fetch_add(records, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_position(&self, partition: Option<i32>, offset: Option<i64>) {
        self.last_partition
            .store(partition.map_or(NO_POSITION, i64::from), Ordering::Relaxed);
        self.last_offset
            .store(offset.unwrap_or(NO_POSITION), Ordering::Relaxed);
    }

    pub(crate) fn record_object(&self, key: String) {
        let mut last = self
            .last_object
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(key);
    }
}

/// 목적지 통계 핸들
///
/// behavior가 전달 워커로 이동한 뒤에도 보고 경로가 통계를 읽을 수 있도록 복제해 둡니다.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    destination: Arc<str>,
    kind: OutputKind,
    stats: Arc<TransportStats>,
}

impl StatsHandle {
    /// 새 핸들을 생성합니다.
    pub fn new(destination: &str, kind: OutputKind) -> Self {
        Self {
            destination: Arc::from(destination),
            kind,
            stats: Arc::new(TransportStats::default()),
        }
    }

    /// 목적지 식별자
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// 카운터
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// 현재 값 스냅샷을 생성합니다.
    pub fn snapshot(&self) -> BehaviorStatistics {
        let stats = &self.stats;
        let position = |value: i64| (value != NO_POSITION).then_some(value);
        BehaviorStatistics {
            destination: self.destination.to_string(),
            kind: self.kind.as_str().to_owned(),
            uploads: stats.uploads.load(Ordering::Relaxed),
            records_sent: stats.records_sent.load(Ordering::Relaxed),
            bytes_sent: stats.bytes_sent.load(Ordering::Relaxed),
            connected: stats.connected.load(Ordering::Relaxed),
            reconnects: stats.reconnects.load(Ordering::Relaxed),
            last_object: stats
                .last_object
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            last_partition: position(stats.last_partition.load(Ordering::Relaxed))
                .and_then(|p| i32::try_from(p).ok()),
            last_offset: position(stats.last_offset.load(Ordering::Relaxed)),
        }
    }
}

/// behavior 통계 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BehaviorStatistics {
    /// 목적지 식별자
    pub destination: String,
    /// 출력 유형
    pub kind: String,
    /// 성공한 업로드 수
    pub uploads: u64,
    /// 전송된 레코드 수
    pub records_sent: u64,
    /// 전송된 바이트 수
    pub bytes_sent: u64,
    /// 연결 유지 여부 (스트림 전송)
    pub connected: bool,
    /// 재연결 횟수
    pub reconnects: u64,
    /// 마지막 오브젝트 키 (S3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_object: Option<String>,
    /// 마지막 파티션 (Kafka)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_partition: Option<i32>,
    /// 마지막 오프셋 (Kafka)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_offset: Option<i64>,
}

// ─── 공통 스트리밍 ─────────────────────────────────────────────────

/// 번들을 렌더러 태스크로 스트리밍하고 전송 측 결과와 합칩니다.
///
/// `transport`는 파이프 읽기 측을 소비하며, 반환 시점에 읽기 측을 놓아야 합니다.
pub(crate) async fn stream_bundle<F, Fut, T>(
    renderer: &Arc<Renderer>,
    name: &str,
    bundle: &Bundle,
    transport: F,
) -> Result<(T, RenderSummary), OutputError>
where
    F: FnOnce(PipeReader) -> Fut,
    Fut: Future<Output = Result<T, OutputError>>,
{
    let ctx = RenderContext::new(name, bundle.byte_size());
    stream_bundle_with(renderer, ctx, bundle, transport).await
}

/// [`stream_bundle`]과 같지만 렌더링 시점 값을 호출자가 정합니다.
pub(crate) async fn stream_bundle_with<F, Fut, T>(
    renderer: &Arc<Renderer>,
    ctx: RenderContext,
    bundle: &Bundle,
    transport: F,
) -> Result<(T, RenderSummary), OutputError>
where
    F: FnOnce(PipeReader) -> Fut,
    Fut: Future<Output = Result<T, OutputError>>,
{
    let (reader, task) = spawn_renderer(
        Arc::clone(renderer),
        ctx,
        bundle.cursor(),
        DEFAULT_PIPE_CAPACITY,
    );
    let result = transport(reader).await;
    finish(task, result).await
}

// ─── Destination ───────────────────────────────────────────────────

/// 여덟 가지 출력 behavior의 닫힌 집합
pub enum Destination {
    /// 로컬 파일
    File(FileBehavior),
    /// S3 오브젝트 스토리지
    S3(S3Behavior),
    /// TCP 스트림
    Tcp(TcpBehavior),
    /// UDP 데이터그램
    Udp(UdpBehavior),
    /// syslog
    Syslog(SyslogBehavior),
    /// HTTP POST
    Http(HttpBehavior),
    /// Splunk HEC
    Splunk(HecBehavior),
    /// Kafka
    Kafka(KafkaBehavior),
}

macro_rules! dispatch {
    ($self:expr, $b:ident => $body:expr) => {
        match $self {
            Destination::File($b) => $body,
            Destination::S3($b) => $body,
            Destination::Tcp($b) => $body,
            Destination::Udp($b) => $body,
            Destination::Syslog($b) => $body,
            Destination::Http($b) => $body,
            Destination::Splunk($b) => $body,
            Destination::Kafka($b) => $body,
        }
    };
}

impl Destination {
    /// 설정의 출력 유형에 맞는 behavior를 초기화합니다.
    ///
    /// 필수 파라미터 누락은 [`OutputError::Configuration`], 자원 획득 실패는
    /// [`OutputError::Connectivity`]입니다.
    pub async fn initialize(
        destination: &str,
        config: Arc<ForwarderConfig>,
    ) -> Result<Self, OutputError> {
        let kind = config.output.kind;
        if kind.requires_destination() && destination.is_empty() {
            return Err(OutputError::Configuration(format!(
                "{kind} output requires a destination"
            )));
        }

        let behavior = match kind {
            OutputKind::File => Self::File(FileBehavior::initialize(destination, &config).await?),
            OutputKind::S3 => Self::S3(S3Behavior::initialize(destination, &config).await?),
            OutputKind::Tcp => Self::Tcp(TcpBehavior::initialize(destination, &config).await?),
            OutputKind::Udp => Self::Udp(UdpBehavior::initialize(destination, &config).await?),
            OutputKind::Syslog => {
                Self::Syslog(SyslogBehavior::initialize(destination, &config).await?)
            }
            OutputKind::Http => Self::Http(HttpBehavior::initialize(destination, &config)?),
            OutputKind::Splunk => Self::Splunk(HecBehavior::initialize(destination, &config)?),
            OutputKind::Kafka => Self::Kafka(KafkaBehavior::initialize(destination, &config)?),
        };

        tracing::info!(
            kind = %kind,
            destination = behavior.key(),
            "output destination initialized"
        );
        Ok(behavior)
    }

    /// 출력 유형
    pub fn kind(&self) -> OutputKind {
        match self {
            Self::File(_) => OutputKind::File,
            Self::S3(_) => OutputKind::S3,
            Self::Tcp(_) => OutputKind::Tcp,
            Self::Udp(_) => OutputKind::Udp,
            Self::Syslog(_) => OutputKind::Syslog,
            Self::Http(_) => OutputKind::Http,
            Self::Splunk(_) => OutputKind::Splunk,
            Self::Kafka(_) => OutputKind::Kafka,
        }
    }
}

impl Behavior for Destination {
    fn key(&self) -> &str {
        dispatch!(self, b => b.key())
    }

    fn describe(&self) -> String {
        dispatch!(self, b => b.describe())
    }

    fn stats_handle(&self) -> StatsHandle {
        dispatch!(self, b => b.stats_handle())
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        dispatch!(self, b => b.upload(name, bundle).await)
    }
}

/// 설정에서 목적지 식별자를 결정합니다. Kafka는 브로커 목록을 사용합니다.
pub fn destination_key(config: &ForwarderConfig) -> &str {
    match config.output.kind {
        OutputKind::Kafka => &config.output.kafka.brokers,
        _ => &config.output.destination,
    }
}
