//! 번들/전달 설정
//!
//! [`BundleConfig`]는 core의 [`ForwarderConfig`](evfwd_core::config::ForwarderConfig)에서
//! 번들러와 전달 코디네이터가 사용하는 값만 추려낸 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use evfwd_core::config::ForwarderConfig;
//! use evfwd_output::config::BundleConfig;
//!
//! let core_config = ForwarderConfig::default();
//! let config = BundleConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use evfwd_core::config::{DEFAULT_BUNDLE_SEND_TIMEOUT_SECS, DEFAULT_BUNDLE_SIZE_MAX, ForwarderConfig};

use crate::error::OutputError;

/// 번들/전달 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// 번들 크기 임계값 (바이트). 누적 크기가 이 값 이상이면 즉시 봉인
    pub bundle_size_max: u64,
    /// 시간 기반 봉인 주기
    pub bundle_send_timeout: Duration,
    /// 빈 번들 업로드 여부 (splunk는 항상 false)
    pub upload_empty_files: bool,
    /// 목적지별 전달 큐 용량 (번들 수)
    pub delivery_queue_capacity: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            bundle_size_max: DEFAULT_BUNDLE_SIZE_MAX,
            bundle_send_timeout: Duration::from_secs(DEFAULT_BUNDLE_SEND_TIMEOUT_SECS),
            upload_empty_files: true,
            delivery_queue_capacity: 16,
        }
    }
}

impl BundleConfig {
    /// core 설정에서 번들 설정을 생성합니다.
    pub fn from_core(core: &ForwarderConfig) -> Self {
        Self {
            bundle_size_max: core.output.bundle_size_max,
            bundle_send_timeout: core.bundle_send_timeout(),
            upload_empty_files: core.upload_empty_files(),
            delivery_queue_capacity: core.output.delivery_queue_capacity,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), OutputError> {
        if self.bundle_size_max == 0 {
            return Err(OutputError::Configuration(
                "bundle_size_max must be greater than 0".to_owned(),
            ));
        }
        if self.bundle_send_timeout.is_zero() {
            return Err(OutputError::Configuration(
                "bundle_send_timeout must be greater than 0".to_owned(),
            ));
        }
        if self.delivery_queue_capacity == 0 {
            return Err(OutputError::Configuration(
                "delivery_queue_capacity must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// 번들 설정 빌더
#[derive(Default)]
pub struct BundleConfigBuilder {
    config: BundleConfig,
}

impl BundleConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 번들 크기 임계값을 설정합니다.
    pub fn bundle_size_max(mut self, bytes: u64) -> Self {
        self.config.bundle_size_max = bytes;
        self
    }

    /// 시간 기반 봉인 주기를 설정합니다.
    pub fn bundle_send_timeout(mut self, timeout: Duration) -> Self {
        self.config.bundle_send_timeout = timeout;
        self
    }

    /// 빈 번들 업로드 여부를 설정합니다.
    pub fn upload_empty_files(mut self, upload: bool) -> Self {
        self.config.upload_empty_files = upload;
        self
    }

    /// 전달 큐 용량을 설정합니다.
    pub fn delivery_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.delivery_queue_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `BundleConfig`를 생성합니다.
    pub fn build(self) -> Result<BundleConfig, OutputError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
