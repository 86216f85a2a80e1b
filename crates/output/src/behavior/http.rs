//! HTTP POST 출력
//!
//! 번들마다 POST 요청 하나를 보내며 요청 본문은 렌더러에서 스트리밍됩니다.
//! 응답 200만 성공이고, 그 외 상태는 `"<status line>\n<body>"` 상세와 함께 실패입니다.
//!
//! [`HttpPoster`]는 Splunk HEC 출력과 공유합니다.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Body, Client, StatusCode, Url};

use evfwd_core::config::{DEFAULT_CONTENT_TYPE, ForwarderConfig};
use evfwd_core::types::OutputKind;

use crate::behavior::{Behavior, StatsHandle, UploadStatus, stream_bundle};
use crate::bundle::Bundle;
use crate::error::OutputError;
use crate::pipe::PipeReader;
use crate::render::Renderer;
use crate::tls::build_client_config;

/// TLS 설정이 적용된 POST 클라이언트
pub(crate) struct HttpPoster {
    client: Client,
    url: Url,
    content_type: HeaderValue,
    authorization: Option<HeaderValue>,
}

impl HttpPoster {
    /// 클라이언트를 생성합니다. `authorization`은 헤더 값 그대로 전송됩니다.
    pub(crate) fn new(
        destination: &str,
        config: &ForwarderConfig,
        authorization: Option<String>,
    ) -> Result<Self, OutputError> {
        let url = Url::parse(destination)
            .map_err(|e| OutputError::Configuration(format!("invalid url '{destination}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OutputError::Configuration(format!(
                "unsupported url scheme '{}'",
                url.scheme()
            )));
        }

        let tls = build_client_config(&config.output.tls)?;
        let client = Client::builder()
            .use_preconfigured_tls((*tls).clone())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| OutputError::Configuration(format!("http client: {e}")))?;

        let content_type = if config.output.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &config.output.content_type
        };
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|e| OutputError::Configuration(format!("invalid content type: {e}")))?;

        let authorization = authorization
            .map(|value| {
                let mut header = HeaderValue::from_str(&value).map_err(|e| {
                    OutputError::Configuration(format!("invalid authorization header: {e}"))
                })?;
                header.set_sensitive(true);
                Ok::<_, OutputError>(header)
            })
            .transpose()?;

        Ok(Self {
            client,
            url,
            content_type,
            authorization,
        })
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    /// 파이프 읽기 측을 요청 본문으로 POST합니다.
    pub(crate) async fn post(&self, body: PipeReader) -> Result<(), OutputError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, self.content_type.clone());
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization.clone());
        }

        let response = request
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    OutputError::connectivity(self.url.as_str(), e)
                } else {
                    OutputError::transmission(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let version = response.version();
        let text = response.text().await.unwrap_or_default();
        Err(OutputError::NonSuccessResponse {
            status: status.as_u16(),
            detail: format!("{version:?} {status}\n{text}"),
        })
    }
}

/// HTTP 출력 behavior
pub struct HttpBehavior {
    key: String,
    poster: HttpPoster,
    renderer: Arc<Renderer>,
    stats: StatsHandle,
}

impl HttpBehavior {
    /// URL과 TLS 설정으로 클라이언트를 만듭니다.
    pub fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let renderer = Renderer::for_format(config.output.format, &config.output.post_template)?;
        let token = &config.output.authorization_token;
        let authorization = (!token.is_empty()).then(|| token.clone());

        Ok(Self {
            key: destination.to_owned(),
            poster: HttpPoster::new(destination, config, authorization)?,
            renderer: Arc::new(renderer),
            stats: StatsHandle::new(destination, OutputKind::Http),
        })
    }
}

impl Behavior for HttpBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!("http POST {}", self.poster.url())
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        post_bundle(&self.poster, &self.renderer, &self.stats, name, bundle).await
    }
}

/// 번들 하나를 POST하고 결과를 통계에 반영합니다.
pub(crate) async fn post_bundle(
    poster: &HttpPoster,
    renderer: &Arc<Renderer>,
    stats: &StatsHandle,
    name: &str,
    bundle: &Bundle,
) -> UploadStatus {
    match stream_bundle(renderer, name, bundle, |reader| poster.post(reader)).await {
        Ok(((), summary)) => {
            stats.stats().record_upload(summary.records, summary.bytes);
            UploadStatus::success(name, summary.records, summary.bytes)
        }
        Err(err) => UploadStatus::failure(name, err),
    }
}
