//! 파이프라인 trait -- 생명주기와 헬스 체크 정의
//!
//! 전달기(forwarder)처럼 백그라운드 태스크를 소유하는 컴포넌트는
//! [`Pipeline`]을 구현하여 데몬이 동일한 방식으로 시작/정지할 수 있게 합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ForwarderError;

/// `Send` 가능한 boxed future
///
/// dyn-compatible trait에서 async 메서드를 표현할 때 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 일부 기능 저하 (예: 최근 업로드 실패)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 시작/정지 생명주기를 가진 파이프라인 trait
///
/// # 생명주기
/// ```text
/// Built → start() → Running → stop() → Stopped
/// ```
///
/// `start()`를 두 번 호출하면 [`PipelineError::AlreadyRunning`](crate::error::PipelineError::AlreadyRunning),
/// 실행 중이 아닐 때 `stop()`을 호출하면
/// [`PipelineError::NotRunning`](crate::error::PipelineError::NotRunning)을 반환해야 합니다.
pub trait Pipeline: Send + Sync {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), ForwarderError>> + Send;

    /// 남은 데이터를 처리하고 백그라운드 태스크를 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), ForwarderError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 파이프라인 trait
///
/// `Box<dyn DynPipeline>`으로 서로 다른 파이프라인을 한 곳에서 관리할 때 사용합니다.
/// [`Pipeline`]을 구현한 모든 타입에 대해 blanket 구현이 제공됩니다.
pub trait DynPipeline: Send + Sync {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), ForwarderError>>;

    /// 백그라운드 태스크를 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), ForwarderError>>;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), ForwarderError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), ForwarderError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
