//! 도메인 타입 -- 출력 유형과 이벤트 직렬화 형식
//!
//! 설정 파일과 출력 모듈이 공유하는 열거형을 정의합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 출력 대상 유형
///
/// 프로세스 하나는 설정된 하나의 출력 유형으로 이벤트를 전달합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// 로컬 파일
    #[default]
    File,
    /// 오브젝트 스토리지 (S3)
    S3,
    /// TCP 소켓
    Tcp,
    /// UDP 소켓
    Udp,
    /// Syslog (UDP/TCP/TLS)
    Syslog,
    /// 일반 HTTP POST
    Http,
    /// Splunk HTTP Event Collector
    Splunk,
    /// Kafka 토픽
    Kafka,
}

impl OutputKind {
    /// 모든 출력 유형 (설정 검증 메시지용)
    pub const ALL: [OutputKind; 8] = [
        Self::File,
        Self::S3,
        Self::Tcp,
        Self::Udp,
        Self::Syslog,
        Self::Http,
        Self::Splunk,
        Self::Kafka,
    ];

    /// 설정 파일에서 쓰는 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::S3 => "s3",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Syslog => "syslog",
            Self::Http => "http",
            Self::Splunk => "splunk",
            Self::Kafka => "kafka",
        }
    }

    /// `output.destination` 값이 필요한 유형인지 확인합니다.
    ///
    /// Kafka는 `output.kafka.brokers`를 대신 사용합니다.
    pub fn requires_destination(&self) -> bool {
        !matches!(self, Self::Kafka)
    }

    /// HTTP 계열(HTTP, Splunk HEC) 유형인지 확인합니다.
    pub fn is_http_family(&self) -> bool {
        matches!(self, Self::Http | Self::Splunk)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "output.kind".to_owned(),
                reason: format!("unknown output kind: {s}"),
            })
    }
}

/// 이벤트 직렬화 형식
///
/// 레코드 자체는 이미 직렬화된 텍스트이며, 형식은 번들 내
/// 레코드 구분자와 기본 템플릿만 결정합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON (레코드 사이 쉼표)
    #[default]
    Json,
    /// LEEF (레코드 사이 개행)
    Leef,
}

impl OutputFormat {
    /// 레코드 사이 구분자를 반환합니다.
    pub fn separator(&self) -> &'static str {
        match self {
            Self::Json => ",",
            Self::Leef => "\n",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Leef => write!(f, "leef"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "leef" => Ok(Self::Leef),
            other => Err(ConfigError::InvalidValue {
                field: "output.format".to_owned(),
                reason: format!("unknown output format: {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_parses_case_insensitively() {
        assert_eq!("HTTP".parse::<OutputKind>().unwrap(), OutputKind::Http);
        assert_eq!(" splunk ".parse::<OutputKind>().unwrap(), OutputKind::Splunk);
        assert!("carrier-pigeon".parse::<OutputKind>().is_err());
    }

    #[test]
    fn output_kind_display_matches_config_name() {
        for kind in OutputKind::ALL {
            assert_eq!(kind.to_string().parse::<OutputKind>().unwrap(), kind);
        }
    }

    #[test]
    fn kafka_does_not_require_destination() {
        assert!(!OutputKind::Kafka.requires_destination());
        assert!(OutputKind::Http.requires_destination());
    }

    #[test]
    fn http_family_is_http_and_splunk() {
        assert!(OutputKind::Http.is_http_family());
        assert!(OutputKind::Splunk.is_http_family());
        assert!(!OutputKind::Tcp.is_http_family());
        assert!(!OutputKind::File.is_http_family());
    }

    #[test]
    fn format_separators() {
        assert_eq!(OutputFormat::Json.separator(), ",");
        assert_eq!(OutputFormat::Leef.separator(), "\n");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: OutputKind,
            format: OutputFormat,
        }
        let parsed: Wrapper = toml::from_str("kind = \"kafka\"\nformat = \"leef\"").unwrap();
        assert_eq!(parsed.kind, OutputKind::Kafka);
        assert_eq!(parsed.format, OutputFormat::Leef);
    }
}
