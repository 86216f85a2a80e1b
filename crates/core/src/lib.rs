//! # evfwd-core
//!
//! evfwd 워크스페이스의 공통 기반 크레이트입니다.
//!
//! - [`config`]: `evfwd.toml` 설정 로딩, 환경변수 오버라이드, 검증
//! - [`error`]: 도메인별 에러 계층
//! - [`types`]: 출력 유형과 이벤트 형식
//! - [`pipeline`]: 시작/정지 생명주기 trait과 헬스 상태
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ForwarderError, PipelineError};

// 설정
pub use config::{ForwarderConfig, GeneralConfig, OutputConfig};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{OutputFormat, OutputKind};
