//! 전달 코디네이터 -- 목적지 키별 순차 업로드 워커
//!
//! 목적지마다 워커 태스크 하나가 [`Behavior`]를 독점 소유하고, 제한된 `mpsc`
//! 큐에서 봉인된 번들을 받아 하나씩 업로드합니다. 큐가 가득 차면 `submit`이
//! 대기하므로 느린 목적지는 번들러까지 역압을 전달합니다.
//!
//! # 업로드 결과 처리
//! - 성공: 업로드/레코드/바이트 카운터 증가
//! - 실패: `warn!` 로그, 실패 카운터 증가, 마지막 에러 기록. 재시도하지 않음
//! - 빈 번들: 빈 업로드가 꺼져 있으면 전송 없이 건너뜀

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use evfwd_core::metrics as m;

use crate::behavior::{Behavior, BehaviorStatistics, StatsHandle, UploadStatus};
use crate::bundle::Bundle;
use crate::error::OutputError;

/// 워커 큐 메시지
#[derive(Debug)]
pub enum Delivery {
    /// 업로드할 번들
    Bundle(Bundle),
    /// 앞선 번들을 모두 처리한 뒤 종료
    Shutdown,
}

// ─── 통계 ──────────────────────────────────────────────────────────

/// 목적지별 전달 통계
#[derive(Debug, Default)]
pub struct DeliveryStats {
    uploaded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    records: AtomicU64,
    bytes: AtomicU64,
    last_status: AtomicU64,
    last_failed: AtomicBool,
    queued: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl DeliveryStats {
    fn record(&self, status: &UploadStatus) {
        self.last_status
            .store(u64::from(status.status), Ordering::Relaxed);
        self.last_failed
            .store(!status.is_success(), Ordering::Relaxed);
        if status.is_success() {
            self.uploaded.fetch_add(1, Ordering::Relaxed);
            self.records.fetch_add(status.records, Ordering::Relaxed);
            self.bytes.fetch_add(status.bytes, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            let mut last = self
                .last_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *last = status.detail();
        }
    }

    /// 실패한 업로드 수
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 마지막 업로드가 실패였는지 확인합니다.
    pub fn last_failed(&self) -> bool {
        self.last_failed.load(Ordering::Relaxed)
    }

    /// 마지막 실패 상세
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 현재 값 스냅샷
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        let attempts = self.uploaded.load(Ordering::Relaxed) + self.failed();
        let last_status = (attempts > 0)
            .then(|| u16::try_from(self.last_status.load(Ordering::Relaxed)).ok())
            .flatten();
        DeliveryStatsSnapshot {
            bundles_uploaded: self.uploaded.load(Ordering::Relaxed),
            bundles_failed: self.failed(),
            empty_bundles_skipped: self.skipped.load(Ordering::Relaxed),
            records_delivered: self.records.load(Ordering::Relaxed),
            bytes_delivered: self.bytes.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            last_status,
            last_error: self.last_error(),
        }
    }
}

/// 전달 통계 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    /// 성공한 번들 수
    pub bundles_uploaded: u64,
    /// 실패한 번들 수
    pub bundles_failed: u64,
    /// 건너뛴 빈 번들 수
    pub empty_bundles_skipped: u64,
    /// 전달된 레코드 수
    pub records_delivered: u64,
    /// 전달된 바이트 수
    pub bytes_delivered: u64,
    /// 큐 대기 번들 수
    pub queued: u64,
    /// 마지막 업로드 상태 코드
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    /// 마지막 실패 상세
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ─── 워커 핸들 ─────────────────────────────────────────────────────

/// 목적지 워커 핸들
pub struct DeliveryHandle {
    key: String,
    description: String,
    tx: mpsc::Sender<Delivery>,
    stats: Arc<DeliveryStats>,
    behavior_stats: StatsHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryHandle {
    /// 목적지 키
    pub fn key(&self) -> &str {
        &self.key
    }

    /// behavior 설명
    pub fn describe(&self) -> &str {
        &self.description
    }

    /// 전달 통계
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// behavior 통계 스냅샷
    pub fn behavior_statistics(&self) -> BehaviorStatistics {
        self.behavior_stats.snapshot()
    }

    /// 번들을 큐에 넣습니다. 큐가 가득 차면 자리가 날 때까지 대기합니다.
    pub async fn submit(&self, bundle: Bundle) -> Result<(), OutputError> {
        let depth = self.stats.queued.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!(m::OUTPUT_QUEUE_DEPTH, m::LABEL_DESTINATION => self.key.clone())
            .set(depth as f64);

        self.tx.send(Delivery::Bundle(bundle)).await.map_err(|_| {
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
            OutputError::Channel(format!("delivery worker for '{}' has stopped", self.key))
        })
    }

    /// 대기 중인 번들을 모두 업로드한 뒤 워커를 종료합니다.
    ///
    /// 두 번째 호출부터는 아무 동작도 하지 않습니다.
    pub async fn shutdown(&self) -> Result<(), OutputError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(task) = task else {
            return Ok(());
        };
        // 워커가 이미 끝났다면 전송 실패는 무시
        let _ = self.tx.send(Delivery::Shutdown).await;
        task.await
            .map_err(|e| OutputError::Channel(format!("delivery worker for '{}' failed: {e}", self.key)))
    }

    /// 워커가 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// behavior를 소유하는 워커 태스크를 시작합니다.
pub fn spawn_worker<B>(behavior: B, capacity: usize, upload_empty: bool) -> DeliveryHandle
where
    B: Behavior + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(DeliveryStats::default());
    let key = behavior.key().to_owned();
    let description = behavior.describe();
    let behavior_stats = behavior.stats_handle();

    let worker = Worker {
        key: key.clone(),
        behavior,
        stats: Arc::clone(&stats),
        upload_empty,
    };
    let task = tokio::spawn(worker.run(rx));

    DeliveryHandle {
        key,
        description,
        tx,
        stats,
        behavior_stats,
        task: Mutex::new(Some(task)),
    }
}

struct Worker<B> {
    key: String,
    behavior: B,
    stats: Arc<DeliveryStats>,
    upload_empty: bool,
}

impl<B: Behavior> Worker<B> {
    async fn run(mut self, mut rx: mpsc::Receiver<Delivery>) {
        tracing::debug!(destination = %self.key, "delivery worker started");

        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Bundle(bundle) => self.deliver(bundle).await,
                Delivery::Shutdown => break,
            }
        }

        // Shutdown 이후 도착한 번들도 유실 없이 처리
        rx.close();
        while let Ok(Delivery::Bundle(bundle)) = rx.try_recv() {
            self.deliver(bundle).await;
        }

        tracing::info!(destination = %self.key, "delivery worker stopped");
    }

    async fn deliver(&mut self, bundle: Bundle) {
        let depth = self
            .stats
            .queued
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        metrics::gauge!(m::OUTPUT_QUEUE_DEPTH, m::LABEL_DESTINATION => self.key.clone())
            .set(depth as f64);

        if bundle.is_empty() && !self.upload_empty {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::OUTPUT_EMPTY_BUNDLES_SKIPPED_TOTAL, m::LABEL_DESTINATION => self.key.clone())
                .increment(1);
            tracing::debug!(destination = %self.key, bundle = bundle.name(), "skipping empty bundle");
            return;
        }

        let started = Instant::now();
        let status = self.behavior.upload(bundle.name(), &bundle).await;
        let elapsed = started.elapsed();
        metrics::histogram!(m::OUTPUT_UPLOAD_DURATION_SECONDS, m::LABEL_DESTINATION => self.key.clone())
            .record(elapsed.as_secs_f64());

        self.stats.record(&status);

        if status.is_success() {
            metrics::counter!(m::OUTPUT_BUNDLES_UPLOADED_TOTAL, m::LABEL_DESTINATION => self.key.clone())
                .increment(1);
            metrics::counter!(m::OUTPUT_RECORDS_DELIVERED_TOTAL, m::LABEL_DESTINATION => self.key.clone())
                .increment(status.records);
            metrics::counter!(m::OUTPUT_BYTES_DELIVERED_TOTAL, m::LABEL_DESTINATION => self.key.clone())
                .increment(status.bytes);
            tracing::debug!(
                destination = %self.key,
                bundle = %status.file_name,
                records = status.records,
                bytes = status.bytes,
                elapsed_ms = elapsed.as_millis() as u64,
                "bundle uploaded"
            );
        } else {
            metrics::counter!(m::OUTPUT_BUNDLES_FAILED_TOTAL, m::LABEL_DESTINATION => self.key.clone())
                .increment(1);
            tracing::warn!(
                destination = %self.key,
                bundle = %status.file_name,
                status = status.status,
                error = %status.detail().unwrap_or_default(),
                "bundle upload failed"
            );
        }
    }
}
