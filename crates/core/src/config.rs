//! 설정 관리 -- evfwd.toml 파싱 및 런타임 설정
//!
//! [`ForwarderConfig`]는 프로세스 전체에서 공유되는 읽기 전용 설정입니다.
//! 한 번 로드한 뒤 `Arc<ForwarderConfig>`로 각 출력 모듈에 주입되며,
//! 로드 이후에는 변경되지 않습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`EVFWD_OUTPUT_KIND=http` 형식)
//! 3. 설정 파일 (`evfwd.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), evfwd_core::error::ForwarderError> {
//! use evfwd_core::config::ForwarderConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ForwarderConfig::load("evfwd.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ForwarderConfig::parse("[output]\nkind = \"udp\"\ndestination = \"127.0.0.1:514\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ForwarderError};
use crate::types::{OutputFormat, OutputKind};

/// 번들 최대 크기 기본값 (10 MiB)
pub const DEFAULT_BUNDLE_SIZE_MAX: u64 = 10 * 1024 * 1024;

/// 번들 전송 주기 기본값 (5분)
pub const DEFAULT_BUNDLE_SEND_TIMEOUT_SECS: u64 = 5 * 60;

/// 기본 Content-Type
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// evfwd 통합 설정
///
/// `evfwd.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
}

impl ForwarderConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ForwarderError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    ///
    /// 필수 값 일부를 환경변수로 주입하는 배포 방식을 위해
    /// 검증은 [`load`](Self::load)에서 오버라이드 이후에 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ForwarderError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ForwarderError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ForwarderError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ForwarderError> {
        toml::from_str(toml_str).map_err(|e| {
            ForwarderError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `EVFWD_{SECTION}_{FIELD}`, 하위 섹션은 경로를 이어 붙임
    /// (`[output.tls] verify` → `EVFWD_OUTPUT_TLS_VERIFY`)
    /// 예: `EVFWD_OUTPUT_DESTINATION=https://collector:8088/services/collector`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "EVFWD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EVFWD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.server_name, "EVFWD_GENERAL_SERVER_NAME");

        // Output
        override_parsed(&mut self.output.kind, "EVFWD_OUTPUT_KIND");
        override_string(&mut self.output.destination, "EVFWD_OUTPUT_DESTINATION");
        override_parsed(&mut self.output.format, "EVFWD_OUTPUT_FORMAT");
        override_string(&mut self.output.content_type, "EVFWD_OUTPUT_CONTENT_TYPE");
        override_string(
            &mut self.output.authorization_token,
            "EVFWD_OUTPUT_AUTHORIZATION_TOKEN",
        );
        override_string(&mut self.output.hec_token, "EVFWD_OUTPUT_HEC_TOKEN");
        override_string(&mut self.output.post_template, "EVFWD_OUTPUT_POST_TEMPLATE");
        override_parsed(
            &mut self.output.upload_empty_files,
            "EVFWD_OUTPUT_UPLOAD_EMPTY_FILES",
        );
        override_parsed(
            &mut self.output.bundle_size_max,
            "EVFWD_OUTPUT_BUNDLE_SIZE_MAX",
        );
        override_parsed(
            &mut self.output.bundle_send_timeout_secs,
            "EVFWD_OUTPUT_BUNDLE_SEND_TIMEOUT_SECS",
        );
        override_parsed(&mut self.output.compress_data, "EVFWD_OUTPUT_COMPRESS_DATA");
        override_parsed(
            &mut self.output.delivery_queue_capacity,
            "EVFWD_OUTPUT_DELIVERY_QUEUE_CAPACITY",
        );
        override_parsed(
            &mut self.output.connect_timeout_secs,
            "EVFWD_OUTPUT_CONNECT_TIMEOUT_SECS",
        );

        // TLS
        let tls = &mut self.output.tls;
        override_string(&mut tls.client_cert, "EVFWD_OUTPUT_TLS_CLIENT_CERT");
        override_string(&mut tls.client_key, "EVFWD_OUTPUT_TLS_CLIENT_KEY");
        override_string(&mut tls.ca_cert, "EVFWD_OUTPUT_TLS_CA_CERT");
        override_parsed(&mut tls.verify, "EVFWD_OUTPUT_TLS_VERIFY");
        override_parsed(&mut tls.tls12_only, "EVFWD_OUTPUT_TLS_TLS12_ONLY");
        override_string(&mut tls.server_name, "EVFWD_OUTPUT_TLS_SERVER_NAME");

        // S3
        let s3 = &mut self.output.s3;
        override_string(&mut s3.credential_profile, "EVFWD_OUTPUT_S3_CREDENTIAL_PROFILE");
        override_string(&mut s3.acl_policy, "EVFWD_OUTPUT_S3_ACL_POLICY");
        override_string(
            &mut s3.server_side_encryption,
            "EVFWD_OUTPUT_S3_SERVER_SIDE_ENCRYPTION",
        );
        override_string(&mut s3.object_prefix, "EVFWD_OUTPUT_S3_OBJECT_PREFIX");
        override_parsed(&mut s3.verbose_key, "EVFWD_OUTPUT_S3_VERBOSE_KEY");
        override_parsed(&mut s3.compress_data, "EVFWD_OUTPUT_S3_COMPRESS_DATA");

        // Kafka
        override_string(&mut self.output.kafka.brokers, "EVFWD_OUTPUT_KAFKA_BROKERS");
        override_string(&mut self.output.kafka.topic_suffix, "EVFWD_OUTPUT_KAFKA_TOPIC_SUFFIX");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ForwarderError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        let output = &self.output;
        let kind = output.kind;

        if kind.requires_destination() && output.destination.trim().is_empty() {
            return Err(missing("output.destination", kind).into());
        }

        match kind {
            OutputKind::Kafka if output.kafka.brokers.trim().is_empty() => {
                return Err(missing("output.kafka.brokers", kind).into());
            }
            OutputKind::Splunk if output.hec_token.trim().is_empty() => {
                return Err(missing("output.hec_token", kind).into());
            }
            _ if kind.is_http_family() => {
                let dest = output.destination.trim();
                if !(dest.starts_with("http://") || dest.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue {
                        field: "output.destination".to_owned(),
                        reason: format!("{kind} output requires an http:// or https:// URL"),
                    }
                    .into());
                }
            }
            _ => {}
        }

        if output.bundle_size_max == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.bundle_size_max".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if output.bundle_send_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.bundle_send_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if output.delivery_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.delivery_queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if output.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.connect_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        // 클라이언트 인증서와 키는 함께 지정되어야 함
        let has_cert = !output.tls.client_cert.is_empty();
        let has_key = !output.tls.client_key.is_empty();
        if has_cert != has_key {
            return Err(ConfigError::InvalidValue {
                field: "output.tls".to_owned(),
                reason: "client_cert and client_key must be set together".to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// 빈 번들 업로드 여부를 반환합니다.
    ///
    /// Splunk HEC는 빈 입력을 거부하므로 설정과 무관하게 `false`입니다.
    pub fn upload_empty_files(&self) -> bool {
        self.output.kind != OutputKind::Splunk && self.output.upload_empty_files
    }

    /// 번들 전송 주기
    pub fn bundle_send_timeout(&self) -> Duration {
        Duration::from_secs(self.output.bundle_send_timeout_secs)
    }

    /// 연결 타임아웃
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.output.connect_timeout_secs)
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// syslog 헤더에 쓰는 호스트 이름
    pub server_name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            server_name: default_server_name(),
        }
    }
}

fn default_server_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// 출력 설정
///
/// 문자열 필드의 빈 값은 "설정되지 않음"을 의미합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 출력 유형
    pub kind: OutputKind,
    /// 유형별 대상 문자열 (경로, `host:port`, URL, 버킷)
    pub destination: String,
    /// 이벤트 형식 (json, leef)
    pub format: OutputFormat,
    /// HTTP Content-Type
    pub content_type: String,
    /// HTTP Authorization 헤더 값 (그대로 전송)
    pub authorization_token: String,
    /// Splunk HEC 토큰
    pub hec_token: String,
    /// 번들 envelope 템플릿 (비어 있으면 유형별 기본값)
    pub post_template: String,
    /// 빈 번들 업로드 여부 (splunk는 항상 false)
    pub upload_empty_files: bool,
    /// 번들 크기 임계값 (바이트)
    pub bundle_size_max: u64,
    /// 번들 전송 주기 (초)
    pub bundle_send_timeout_secs: u64,
    /// 파일 출력 gzip 압축 여부
    pub compress_data: bool,
    /// 목적지별 전달 큐 용량 (번들 수)
    pub delivery_queue_capacity: usize,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// TLS 설정
    #[serde(default)]
    pub tls: TlsConfig,
    /// S3 설정
    #[serde(default)]
    pub s3: S3Config,
    /// Kafka 설정
    #[serde(default)]
    pub kafka: KafkaConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::File,
            destination: String::new(),
            format: OutputFormat::Json,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            authorization_token: String::new(),
            hec_token: String::new(),
            post_template: String::new(),
            upload_empty_files: true,
            bundle_size_max: DEFAULT_BUNDLE_SIZE_MAX,
            bundle_send_timeout_secs: DEFAULT_BUNDLE_SEND_TIMEOUT_SECS,
            compress_data: false,
            delivery_queue_capacity: 16,
            connect_timeout_secs: 30,
            tls: TlsConfig::default(),
            s3: S3Config::default(),
            kafka: KafkaConfig::default(),
        }
    }
}

/// TLS 설정 (네트워크 출력 공통)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// 클라이언트 인증서 PEM 경로
    pub client_cert: String,
    /// 클라이언트 개인키 PEM 경로
    pub client_key: String,
    /// 신뢰할 CA PEM 경로 (비어 있으면 webpki 루트)
    pub ca_cert: String,
    /// 서버 인증서 검증 여부
    pub verify: bool,
    /// TLS 1.2 이상만 허용 (TLS 클라이언트의 하한이 1.2라 `false`여도 동일)
    pub tls12_only: bool,
    /// 인증서 검증 시 사용할 서버 이름
    pub server_name: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            client_cert: String::new(),
            client_key: String::new(),
            ca_cert: String::new(),
            verify: true,
            tls12_only: true,
            server_name: String::new(),
        }
    }
}

impl TlsConfig {
    /// 클라이언트 인증서가 설정되었는지 확인합니다.
    pub fn has_client_auth(&self) -> bool {
        !self.client_cert.is_empty() && !self.client_key.is_empty()
    }
}

/// S3 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS 자격 증명 프로파일 이름
    pub credential_profile: String,
    /// canned ACL 정책
    pub acl_policy: String,
    /// 서버 측 암호화 방식 (예: AES256)
    pub server_side_encryption: String,
    /// 오브젝트 키 접두어
    pub object_prefix: String,
    /// 오브젝트 키에 `YYYY/MM/DD/` 경로 포함
    pub verbose_key: bool,
    /// gzip 압축 업로드
    pub compress_data: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            credential_profile: String::new(),
            acl_policy: String::new(),
            server_side_encryption: String::new(),
            object_prefix: String::new(),
            verbose_key: false,
            compress_data: true,
        }
    }
}

/// Kafka 출력 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// 브로커 목록 (쉼표 구분)
    pub brokers: String,
    /// 토픽 이름 접미어
    pub topic_suffix: String,
}

fn missing(field: &str, kind: OutputKind) -> ConfigError {
    ConfigError::MissingParameter {
        field: field.to_owned(),
        kind: kind.to_string(),
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T>(target: &mut T, env_key: &str)
where
    T: std::str::FromStr,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse value from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> ForwarderConfig {
        let mut config = ForwarderConfig::default();
        config.output.kind = OutputKind::Http;
        config.output.destination = "https://collector.example.com/events".to_owned();
        config
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = ForwarderConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(!config.general.server_name.is_empty());
        assert_eq!(config.output.kind, OutputKind::File);
        assert_eq!(config.output.bundle_size_max, 10 * 1024 * 1024);
        assert_eq!(config.bundle_send_timeout(), Duration::from_secs(300));
        assert_eq!(config.output.content_type, "application/json");
        assert!(config.output.upload_empty_files);
        assert!(config.output.tls.verify);
        assert!(config.output.tls.tls12_only);
        assert!(config.output.s3.compress_data);
    }

    #[test]
    fn default_config_requires_destination() {
        let config = ForwarderConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ForwarderError::Config(ConfigError::MissingParameter { .. })
        ));
        assert!(err.to_string().contains("output.destination"));
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[output]
kind = "udp"
destination = "127.0.0.1:5514"
"#;
        let config = ForwarderConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.output.kind, OutputKind::Udp);
        assert_eq!(config.output.delivery_queue_capacity, 16);
        config.validate().unwrap();
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
server_name = "sensor-01"

[output]
kind = "splunk"
destination = "https://splunk.internal:8088/services/collector"
format = "json"
hec_token = "00000000-1111-2222-3333-444444444444"
upload_empty_files = true
bundle_size_max = 1048576
bundle_send_timeout_secs = 30
delivery_queue_capacity = 4
connect_timeout_secs = 10

[output.tls]
ca_cert = "/etc/evfwd/ca.pem"
verify = false
tls12_only = true
server_name = "splunk.internal"

[output.s3]
object_prefix = "events/"
verbose_key = true

[output.kafka]
brokers = "k1:9092"
topic_suffix = "-evfwd"
"#;
        let config = ForwarderConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.server_name, "sensor-01");
        assert_eq!(config.output.kind, OutputKind::Splunk);
        assert_eq!(config.output.bundle_size_max, 1_048_576);
        assert_eq!(config.bundle_send_timeout(), Duration::from_secs(30));
        assert!(!config.output.tls.verify);
        assert_eq!(config.output.tls.server_name, "splunk.internal");
        assert!(config.output.s3.verbose_key);
        assert_eq!(config.output.kafka.topic_suffix, "-evfwd");
    }

    #[test]
    fn splunk_never_uploads_empty_files() {
        let mut config = http_config();
        config.output.upload_empty_files = true;
        assert!(config.upload_empty_files());

        config.output.kind = OutputKind::Splunk;
        assert!(!config.upload_empty_files());
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = ForwarderConfig::parse("invalid = [[[toml");
        assert!(matches!(
            result.unwrap_err(),
            ForwarderError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn from_str_unknown_kind_returns_error() {
        let result = ForwarderConfig::parse("[output]\nkind = \"carrier-pigeon\"");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = http_config();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = http_config();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_kafka_requires_brokers_not_destination() {
        let mut config = ForwarderConfig::default();
        config.output.kind = OutputKind::Kafka;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.kafka.brokers"));

        config.output.kafka.brokers = "localhost:9092".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn validate_splunk_requires_token() {
        let mut config = http_config();
        config.output.kind = OutputKind::Splunk;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.hec_token"));
    }

    #[test]
    fn validate_http_requires_url() {
        let mut config = http_config();
        config.output.destination = "collector.example.com:80".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.destination"));
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let mut config = http_config();
        config.output.bundle_size_max = 0;
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("bundle_size_max")
        );

        let mut config = http_config();
        config.output.bundle_send_timeout_secs = 0;
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("bundle_send_timeout_secs")
        );

        let mut config = http_config();
        config.output.delivery_queue_capacity = 0;
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("delivery_queue_capacity")
        );
    }

    #[test]
    fn validate_rejects_cert_without_key() {
        let mut config = http_config();
        config.output.tls.client_cert = "/etc/evfwd/client.pem".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_key"));

        config.output.tls.client_key = "/etc/evfwd/client.key".to_owned();
        config.validate().unwrap();
        assert!(config.output.tls.has_client_auth());
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_EVFWD_STR", "overridden") };
        override_string(&mut val, "TEST_EVFWD_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_EVFWD_STR") };
    }

    #[test]
    fn env_override_bool_valid() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_EVFWD_BOOL", "true") };
        override_parsed(&mut val, "TEST_EVFWD_BOOL");
        assert!(val);
        unsafe { std::env::remove_var("TEST_EVFWD_BOOL") };
    }

    #[test]
    fn env_override_invalid_keeps_original() {
        let mut val = 42u64;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_EVFWD_U64_BAD", "lots") };
        override_parsed(&mut val, "TEST_EVFWD_U64_BAD");
        assert_eq!(val, 42); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_EVFWD_U64_BAD") };
    }

    #[test]
    fn env_override_output_kind() {
        let mut kind = OutputKind::File;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_EVFWD_KIND", "syslog") };
        override_parsed(&mut kind, "TEST_EVFWD_KIND");
        assert_eq!(kind, OutputKind::Syslog);
        unsafe { std::env::remove_var("TEST_EVFWD_KIND") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_EVFWD_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = http_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ForwarderConfig::parse(&toml_str).unwrap();
        assert_eq!(config.output.kind, parsed.output.kind);
        assert_eq!(config.output.destination, parsed.output.destination);
        assert_eq!(config.output.bundle_size_max, parsed.output.bundle_size_max);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = ForwarderConfig::from_file("/nonexistent/path/evfwd.toml").await;
        assert!(matches!(
            result.unwrap_err(),
            ForwarderError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
