//! # evfwd-output
//!
//! 이벤트 레코드를 번들로 누적하고, 봉인된 번들을 목적지로 스트리밍 전송합니다.
//!
//! # 모듈 구성
//!
//! - [`bundle`]: 이벤트 레코드, 누적 버퍼, 봉인된 번들
//! - [`bundler`]: 목적지 키별 크기/시간 봉인 정책
//! - [`render`]: 봉투 템플릿 파싱과 스트리밍 렌더링
//! - [`pipe`]: 렌더러와 전송 사이의 제한된 바이트 파이프
//! - [`behavior`]: 출력 유형별 목적지 구현 (file, s3, tcp, udp, syslog, http, splunk, kafka)
//! - [`coordinator`]: 목적지별 순차 업로드 워커와 전달 통계
//! - [`forwarder`]: 전체 흐름 오케스트레이션 (Pipeline trait 구현)
//! - [`tls`], [`net`], [`compress`]: 전송 공통 유틸리티
//! - [`config`]: 번들/전달 설정 (core 설정에서 추출)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! append -> Bundler -> (seal) -> DeliveryHandle -> worker -> Destination::upload
//!                                                               |
//!                                       Renderer -> byte pipe -> transport
//! ```

pub mod behavior;
pub mod bundle;
pub mod bundler;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod forwarder;
pub mod pipe;
pub mod render;

pub mod compress;
pub mod net;
pub mod tls;

// --- 주요 타입 re-export ---

// 포워더
pub use forwarder::{DestinationStatistics, Forwarder, ForwarderBuilder};

// 설정
pub use config::{BundleConfig, BundleConfigBuilder};

// 에러
pub use error::OutputError;

// 번들
pub use bundle::{Bundle, BundleBuffer, EventRecord, RecordSource};
pub use bundler::{Bundler, SealTrigger};

// 목적지
pub use behavior::{Behavior, BehaviorStatistics, Destination, UploadStatus};

// 전달
pub use coordinator::{DeliveryHandle, DeliveryStatsSnapshot};

// 렌더링
pub use render::{PostTemplate, Renderer};
