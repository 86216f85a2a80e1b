//! Splunk HTTP Event Collector 출력
//!
//! HTTP 출력과 같은 POST 방식이지만 `Authorization: Splunk <token>` 헤더와
//! 레코드마다 `{"sourcetype":…,"event":…}`로 감싸는 기본 템플릿을 사용합니다.
//! HEC는 빈 본문을 거부하므로 빈 번들 업로드는 설정과 무관하게 꺼져 있습니다.

use std::sync::Arc;

use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::behavior::http::{HttpPoster, post_bundle};
use crate::behavior::{Behavior, StatsHandle, UploadStatus};
use crate::bundle::Bundle;
use crate::error::OutputError;
use crate::render::Renderer;

/// HEC 인증 스킴
const HEC_AUTH_SCHEME: &str = "Splunk";

/// Splunk HEC 출력 behavior
pub struct HecBehavior {
    key: String,
    poster: HttpPoster,
    renderer: Arc<Renderer>,
    stats: StatsHandle,
}

impl HecBehavior {
    /// HEC 엔드포인트 URL과 토큰으로 클라이언트를 만듭니다.
    pub fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let token = &config.output.hec_token;
        if token.is_empty() {
            return Err(OutputError::Configuration(
                "splunk output requires output.hec_token".to_owned(),
            ));
        }
        let renderer = Renderer::splunk(&config.output.post_template)?;
        let poster = HttpPoster::new(destination, config, Some(format!("{HEC_AUTH_SCHEME} {token}")))?;

        Ok(Self {
            key: destination.to_owned(),
            poster,
            renderer: Arc::new(renderer),
            stats: StatsHandle::new(destination, OutputKind::Splunk),
        })
    }
}

impl Behavior for HecBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!("splunk hec {}", self.poster.url())
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        post_bundle(&self.poster, &self.renderer, &self.stats, name, bundle).await
    }
}
