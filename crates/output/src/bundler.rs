//! 번들러 -- 목적지 키별 누적과 봉인 정책
//!
//! 키마다 [`BundleBuffer`] 하나를 두고 두 가지 조건으로 봉인합니다.
//!
//! - 크기: `append` 후 누적 바이트가 `bundle_size_max` 이상이면 즉시 봉인
//! - 시간: `tick`이 호출될 때마다 모든 등록 키를 봉인. 빈 버퍼는
//!   `upload_empty_files`가 켜져 있을 때만 빈 번들로 봉인
//!
//! 번들러 자체는 동기 자료구조이며, 동시 접근 직렬화는 호출자(Forwarder)의
//! 뮤텍스가 담당합니다.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;

use crate::bundle::{Bundle, BundleBuffer, EventRecord};
use crate::config::BundleConfig;
use crate::error::OutputError;

/// 번들 이름 접두어
pub const BUNDLE_NAME_PREFIX: &str = "event-forwarder";

/// 봉인 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SealTrigger {
    /// 크기 임계값 도달
    Size,
    /// 주기 타이머
    Timer,
    /// 종료 시 플러시
    Shutdown,
}

impl SealTrigger {
    /// 메트릭 레이블 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SealTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 목적지 키별 번들 누적기
pub struct Bundler {
    config: BundleConfig,
    buffers: HashMap<String, BundleBuffer>,
    sequence: u64,
}

impl Bundler {
    /// 새 번들러를 생성합니다.
    pub fn new(config: BundleConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            sequence: 0,
        }
    }

    /// 목적지 키를 등록합니다. 이미 등록된 키면 `false`를 반환합니다.
    pub fn register(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.buffers.contains_key(&key) {
            return false;
        }
        self.buffers.insert(key.clone(), BundleBuffer::new(key));
        true
    }

    /// 등록된 키 목록
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// 레코드를 추가합니다. 크기 임계값에 도달하면 봉인된 번들을 반환합니다.
    ///
    /// 등록되지 않은 키는 [`OutputError::Configuration`]입니다.
    pub fn append(&mut self, key: &str, record: EventRecord) -> Result<Option<Bundle>, OutputError> {
        let size_max = self.config.bundle_size_max;
        let buffer = self
            .buffers
            .get_mut(key)
            .ok_or_else(|| OutputError::Configuration(format!("unknown destination key '{key}'")))?;

        if buffer.push(record) < size_max {
            return Ok(None);
        }

        self.sequence += 1;
        Ok(Some(buffer.seal(bundle_name(self.sequence))))
    }

    /// 주기 봉인. 비어 있지 않은 버퍼와, 설정에 따라 빈 버퍼를 봉인합니다.
    pub fn tick(&mut self) -> Vec<Bundle> {
        let include_empty = self.config.upload_empty_files;
        self.seal_where(|buffer| include_empty || !buffer.is_empty())
    }

    /// 종료 플러시. 비어 있지 않은 버퍼만 봉인합니다.
    pub fn flush_all(&mut self) -> Vec<Bundle> {
        self.seal_where(|buffer| !buffer.is_empty())
    }

    /// 키의 현재 누적 (레코드 수, 바이트 수)
    pub fn pending(&self, key: &str) -> Option<(usize, u64)> {
        self.buffers
            .get(key)
            .map(|buffer| (buffer.len(), buffer.byte_size()))
    }

    fn seal_where(&mut self, mut predicate: impl FnMut(&BundleBuffer) -> bool) -> Vec<Bundle> {
        let mut buffers: Vec<&mut BundleBuffer> = self.buffers.values_mut().collect();
        buffers.sort_by(|a, b| a.key().cmp(b.key()));

        let mut sealed = Vec::new();
        for buffer in buffers {
            if !predicate(buffer) {
                continue;
            }
            self.sequence += 1;
            sealed.push(buffer.seal(bundle_name(self.sequence)));
        }
        sealed
    }
}

/// `event-forwarder.<UTC yyyymmddTHHMMSS>.<sequence>`
fn bundle_name(sequence: u64) -> String {
    format!(
        "{BUNDLE_NAME_PREFIX}.{}.{sequence}",
        Utc::now().format("%Y%m%dT%H%M%S")
    )
}
