//! Forwarder -- 번들러, 봉인 타이머, 목적지 워커를 묶는 진입점
//!
//! [`Forwarder`]는 core의 [`Pipeline`](evfwd_core::pipeline::Pipeline) trait을 구현하여
//! `evfwd-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! append ─┐
//!         ├─> Mutex<Bundler> ──(sealed)──> DeliveryHandle ──mpsc──> worker ──> Destination
//! timer ──┘
//! ```
//!
//! 번들러 잠금 안에서 봉인한 번들을 키별 outbox에 넣고, 번들러 잠금을 놓은 뒤
//! 키별 디스패치 잠금 아래에서 큐에 넣습니다. 키 안에서는 봉인 순서와 큐 투입 순서가 같고,
//! 한 키의 큐가 가득 차도 다른 키의 append와 타이머 봉인은 진행됩니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::future::join_all;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use evfwd_core::config::ForwarderConfig;
use evfwd_core::error::{ForwarderError, PipelineError};
use evfwd_core::metrics as m;
use evfwd_core::pipeline::{HealthStatus, Pipeline};

use crate::behavior::{Behavior, BehaviorStatistics, Destination, destination_key};
use crate::bundle::{Bundle, EventRecord};
use crate::bundler::{Bundler, SealTrigger};
use crate::config::BundleConfig;
use crate::coordinator::{DeliveryHandle, DeliveryStatsSnapshot, spawn_worker};
use crate::error::OutputError;

/// Forwarder 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwarderState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 목적지 하나의 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationStatistics {
    /// behavior 전송 통계
    pub behavior: BehaviorStatistics,
    /// 코디네이터 전달 통계
    pub delivery: DeliveryStatsSnapshot,
}

/// 목적지 키 하나의 전달 경로
///
/// 봉인된 번들은 번들러 잠금 안에서 `outbox`에 들어가므로 봉인 순서가 유지됩니다.
/// 큐 투입은 키별 `dispatch` 잠금을 잡은 쪽이 `outbox`를 비우며 수행하고,
/// 다른 키의 잠금이나 번들러 잠금은 잡지 않습니다.
struct Lane {
    outbox: StdMutex<VecDeque<Bundle>>,
    dispatch: Mutex<()>,
    handle: DeliveryHandle,
}

impl Lane {
    fn new(handle: DeliveryHandle) -> Self {
        Self {
            outbox: StdMutex::new(VecDeque::new()),
            dispatch: Mutex::new(()),
            handle,
        }
    }

    fn push(&self, bundle: Bundle) {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(bundle);
    }

    fn pop(&self) -> Option<Bundle> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    /// 대기 중인 번들을 순서대로 큐에 넣습니다. 큐가 가득 차면 이 키만 대기합니다.
    async fn drain(&self, trigger: SealTrigger) -> Result<usize, OutputError> {
        let _dispatch = self.dispatch.lock().await;
        let mut dispatched = 0;
        while let Some(bundle) = self.pop() {
            metrics::counter!(m::FORWARDER_BUNDLES_SEALED_TOTAL, m::LABEL_TRIGGER => trigger.as_str())
                .increment(1);
            tracing::debug!(
                destination = bundle.key(),
                bundle = bundle.name(),
                records = bundle.len(),
                bytes = bundle.byte_size(),
                trigger = %trigger,
                "bundle sealed"
            );
            self.handle.submit(bundle).await?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

/// append/타이머/정지 경로가 공유하는 상태
struct Shared {
    bundler: Mutex<Bundler>,
    lanes: HashMap<String, Lane>,
}

impl Shared {
    fn lane(&self, key: &str) -> Result<&Lane, OutputError> {
        self.lanes
            .get(key)
            .ok_or_else(|| OutputError::Configuration(format!("no delivery worker for '{key}'")))
    }

    async fn append(&self, key: &str, record: EventRecord) -> Result<(), OutputError> {
        let lane = self.lane(key)?;
        let sealed = {
            let mut bundler = self.bundler.lock().await;
            let sealed = bundler.append(key, record)?;
            if let Some(bundle) = sealed {
                lane.push(bundle);
                true
            } else {
                false
            }
        };
        metrics::counter!(m::FORWARDER_RECORDS_APPENDED_TOTAL, m::LABEL_DESTINATION => key.to_owned())
            .increment(1);

        if sealed {
            lane.drain(SealTrigger::Size).await?;
        }
        Ok(())
    }

    /// 타이머/정지 봉인. 큐에 넣은 번들 수를 반환합니다.
    async fn seal_all(&self, trigger: SealTrigger) -> usize {
        let mut keys = Vec::new();
        {
            let mut bundler = self.bundler.lock().await;
            let sealed = match trigger {
                SealTrigger::Shutdown => bundler.flush_all(),
                SealTrigger::Timer | SealTrigger::Size => bundler.tick(),
            };
            for bundle in sealed {
                let key = bundle.key().to_owned();
                match self.lane(&key) {
                    Ok(lane) => lane.push(bundle),
                    Err(e) => {
                        tracing::error!(destination = %key, error = %e, "failed to queue bundle");
                        continue;
                    }
                }
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        // 키마다 독립적으로 드레인하여 가득 찬 큐 하나가 다른 키를 막지 않게 함
        let results = join_all(keys.iter().map(|key| async move {
            let result = match self.lane(key) {
                Ok(lane) => lane.drain(trigger).await,
                Err(e) => Err(e),
            };
            (key, result)
        }))
        .await;

        let mut dispatched = 0;
        for (key, result) in results {
            match result {
                Ok(n) => dispatched += n,
                Err(e) => tracing::error!(destination = %key, error = %e, "failed to queue bundle"),
            }
        }
        dispatched
    }

    fn handle(&self, key: &str) -> Option<&DeliveryHandle> {
        self.lanes.get(key).map(|lane| &lane.handle)
    }
}

type WorkerSpawner = Box<dyn FnOnce(usize, bool) -> DeliveryHandle + Send>;

/// 이벤트 포워더
///
/// # 사용 예시
/// ```ignore
/// use evfwd_output::{EventRecord, ForwarderBuilder};
///
/// let mut forwarder = ForwarderBuilder::new()
///     .config(Arc::new(config))
///     .build()
///     .await?;
///
/// forwarder.start().await?;
/// forwarder.append(&key, EventRecord::new(line)).await?;
/// forwarder.stop().await?;
/// ```
pub struct Forwarder {
    config: Arc<ForwarderConfig>,
    bundle_config: BundleConfig,
    state: ForwarderState,
    shared: Arc<Shared>,
    keys: Vec<String>,
    cancel: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl Forwarder {
    /// 레코드를 목적지 키의 버퍼에 추가합니다.
    ///
    /// 크기 임계값에 도달하면 봉인된 번들을 큐에 넣으며, 그 키의 큐가 가득 차 있으면 대기합니다.
    pub async fn append(&self, key: &str, record: EventRecord) -> Result<(), OutputError> {
        if self.state == ForwarderState::Stopped {
            return Err(OutputError::Channel("forwarder is stopped".to_owned()));
        }
        self.shared.append(key, record).await
    }

    /// 등록된 목적지 키 (등록 순서)
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 목적지 통계
    pub fn statistics(&self, key: &str) -> Option<DestinationStatistics> {
        self.shared.handle(key).map(|handle| DestinationStatistics {
            behavior: handle.behavior_statistics(),
            delivery: handle.stats().snapshot(),
        })
    }

    /// 모든 목적지 통계 (등록 순서)
    pub fn statistics_all(&self) -> Vec<DestinationStatistics> {
        self.keys
            .iter()
            .filter_map(|key| self.statistics(key))
            .collect()
    }

    /// 목적지 설명
    pub fn describe(&self, key: &str) -> Option<&str> {
        self.shared.handle(key).map(DeliveryHandle::describe)
    }

    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ForwarderState::Initialized => "initialized",
            ForwarderState::Running => "running",
            ForwarderState::Stopped => "stopped",
        }
    }

    /// 포워더 설정
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// 번들 설정
    pub fn bundle_config(&self) -> &BundleConfig {
        &self.bundle_config
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let period = self.bundle_config.bundle_send_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let sealed = shared.seal_all(SealTrigger::Timer).await;
                        tracing::debug!(bundles = sealed, "bundle timer fired");
                    }
                }
            }
        })
    }
}

impl Pipeline for Forwarder {
    async fn start(&mut self) -> Result<(), ForwarderError> {
        match self.state {
            ForwarderState::Running => return Err(PipelineError::AlreadyRunning.into()),
            ForwarderState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "a stopped forwarder cannot be restarted".to_owned(),
                )
                .into());
            }
            ForwarderState::Initialized => {}
        }

        tracing::info!(
            destinations = self.keys.len(),
            bundle_size_max = self.bundle_config.bundle_size_max,
            bundle_send_timeout_secs = self.bundle_config.bundle_send_timeout.as_secs(),
            "starting forwarder"
        );
        self.timer = Some(self.spawn_timer());
        self.state = ForwarderState::Running;
        tracing::info!("forwarder started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ForwarderError> {
        if self.state != ForwarderState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping forwarder");

        // 1. 타이머 중단
        self.cancel.cancel();
        if let Some(timer) = self.timer.take()
            && let Err(e) = timer.await
        {
            tracing::warn!(error = %e, "bundle timer task ended abnormally");
        }

        // 2. 남은 레코드 봉인
        let flushed = self.shared.seal_all(SealTrigger::Shutdown).await;
        if flushed > 0 {
            tracing::info!(bundles = flushed, "flushed pending bundles");
        }

        // 3. 워커 드레인
        for key in &self.keys {
            if let Some(handle) = self.shared.handle(key)
                && let Err(e) = handle.shutdown().await
            {
                tracing::warn!(destination = %key, error = %e, "delivery worker shutdown failed");
            }
        }

        self.state = ForwarderState::Stopped;
        tracing::info!("forwarder stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ForwarderState::Running => {
                let failing: Vec<String> = self
                    .keys
                    .iter()
                    .filter_map(|key| self.shared.handle(key))
                    .filter(|handle| handle.stats().last_failed())
                    .map(|handle| {
                        format!(
                            "{}: {}",
                            handle.key(),
                            handle.stats().last_error().unwrap_or_default()
                        )
                    })
                    .collect();
                if failing.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded(format!("last upload failed for {}", failing.join("; ")))
                }
            }
            ForwarderState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ForwarderState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// Forwarder 빌더
///
/// behavior를 지정하지 않으면 설정의 `output.kind`와 목적지로 [`Destination`]을
/// 초기화합니다.
pub struct ForwarderBuilder {
    config: Option<Arc<ForwarderConfig>>,
    bundle_config: Option<BundleConfig>,
    spawners: Vec<(String, WorkerSpawner)>,
}

impl ForwarderBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: None,
            bundle_config: None,
            spawners: Vec::new(),
        }
    }

    /// 포워더 설정을 지정합니다.
    pub fn config(mut self, config: Arc<ForwarderConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// 번들 설정을 지정합니다. 생략하면 포워더 설정에서 추출합니다.
    pub fn bundle_config(mut self, config: BundleConfig) -> Self {
        self.bundle_config = Some(config);
        self
    }

    /// 이미 초기화된 behavior를 목적지로 추가합니다.
    pub fn behavior<B>(mut self, behavior: B) -> Self
    where
        B: Behavior + 'static,
    {
        let key = behavior.key().to_owned();
        let spawner: WorkerSpawner =
            Box::new(move |capacity, upload_empty| spawn_worker(behavior, capacity, upload_empty));
        self.spawners.push((key, spawner));
        self
    }

    /// 포워더를 생성합니다.
    ///
    /// # Errors
    /// - 번들 설정이 유효하지 않은 경우
    /// - 목적지 초기화에 실패한 경우
    /// - 같은 목적지 키가 두 번 추가된 경우
    pub async fn build(self) -> Result<Forwarder, ForwarderError> {
        let config = self.config.unwrap_or_default();
        let bundle_config = self
            .bundle_config
            .unwrap_or_else(|| BundleConfig::from_core(&config));
        bundle_config.validate()?;

        let mut spawners = self.spawners;
        if spawners.is_empty() {
            let key = destination_key(&config).to_owned();
            let destination = Destination::initialize(&key, Arc::clone(&config)).await?;
            let key = destination.key().to_owned();
            let spawner: WorkerSpawner = Box::new(move |capacity, upload_empty| {
                spawn_worker(destination, capacity, upload_empty)
            });
            spawners.push((key, spawner));
        }

        let mut bundler = Bundler::new(bundle_config.clone());
        for (key, _) in &spawners {
            if !bundler.register(key.clone()) {
                return Err(OutputError::Configuration(format!(
                    "destination key '{key}' registered twice"
                ))
                .into());
            }
        }

        let mut keys = Vec::with_capacity(spawners.len());
        let mut lanes = HashMap::with_capacity(spawners.len());
        for (key, spawn) in spawners {
            let handle = spawn(
                bundle_config.delivery_queue_capacity,
                bundle_config.upload_empty_files,
            );
            tracing::info!(destination = %key, describe = handle.describe(), "delivery worker ready");
            keys.push(key.clone());
            lanes.insert(key, Lane::new(handle));
        }

        Ok(Forwarder {
            config,
            bundle_config,
            state: ForwarderState::Initialized,
            shared: Arc::new(Shared {
                bundler: Mutex::new(bundler),
                lanes,
            }),
            keys,
            cancel: CancellationToken::new(),
            timer: None,
        })
    }
}

impl Default for ForwarderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
