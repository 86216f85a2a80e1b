//! 출력 에러 타입
//!
//! [`OutputError`]는 목적지 초기화와 번들 업로드에서 발생하는 모든 에러를 표현합니다.
//! `From<OutputError> for ForwarderError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 업로드 중 발생한 에러는 전파되지 않고 [`UploadStatus`](crate::behavior::UploadStatus)에
//! 담겨 전달 코디네이터로 반환됩니다.

use evfwd_core::error::{ForwarderError, PipelineError};

/// 출력 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// 필수 연결 파라미터 누락 또는 잘못된 값 (초기화 시 치명적)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 전송 자원 획득 실패 (연결 거부, TLS 핸드셰이크 실패, 쓰기 불가 경로)
    #[error("connectivity error: {destination}: {reason}")]
    Connectivity {
        /// 목적지 식별자
        destination: String,
        /// 실패 사유
        reason: String,
    },

    /// 스트리밍 중 전송 실패 (쓰기 실패, 부분 전송)
    #[error("transmission error: {0}")]
    Transmission(String),

    /// HTTP 계열 목적지의 200 이외 응답
    ///
    /// `detail`은 `"<status line>\n<response body>"` 형식입니다.
    #[error("non-success response: {detail}")]
    NonSuccessResponse {
        /// 응답 상태 코드
        status: u16,
        /// 상태 줄과 응답 본문
        detail: String,
    },

    /// 템플릿 파싱/렌더링 또는 레코드 소스 읽기 실패
    #[error("render error: {0}")]
    Render(String),

    /// 내부 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutputError {
    /// 업로드 상태 코드를 반환합니다.
    ///
    /// HTTP 응답을 받은 경우에만 실제 상태 코드이고, 나머지는 0입니다.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NonSuccessResponse { status, .. } => *status,
            _ => 0,
        }
    }

    pub(crate) fn connectivity(destination: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connectivity {
            destination: destination.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transmission(reason: impl std::fmt::Display) -> Self {
        Self::Transmission(reason.to_string())
    }
}

impl From<OutputError> for ForwarderError {
    fn from(err: OutputError) -> Self {
        ForwarderError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
