//! S3 오브젝트 스토리지 출력
//!
//! 번들을 임시 스풀 파일에 렌더링(기본 gzip)한 뒤 오브젝트 하나로 업로드합니다.
//!
//! - 목적지 형식: `bucket` 또는 `region:bucket`
//! - 오브젝트 키: `object_prefix` + (`verbose_key`면 `YYYY/MM/DD/`) + 번들 이름 (+ `.gz`)
//!
//! 실제 업로드는 [`ObjectStoreClient`] trait 뒤에 있으며 AWS SDK 구현은
//! `s3` feature로 컴파일됩니다.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use evfwd_core::BoxFuture;
use evfwd_core::config::{ForwarderConfig, S3Config};
use evfwd_core::types::OutputKind;

use crate::behavior::{Behavior, StatsHandle, UploadStatus, stream_bundle};
use crate::bundle::Bundle;
use crate::compress::{copy_gzip, copy_plain};
use crate::error::OutputError;
use crate::render::Renderer;

/// 오브젝트 업로드 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    /// 버킷 이름
    pub bucket: String,
    /// 오브젝트 키
    pub key: String,
    /// 업로드할 스풀 파일 경로
    pub body: PathBuf,
    /// 본문 크기 (바이트)
    pub content_length: u64,
    /// `Content-Encoding` (gzip 압축 시)
    pub content_encoding: Option<String>,
    /// canned ACL
    pub acl: Option<String>,
    /// 서버 측 암호화 방식
    pub server_side_encryption: Option<String>,
}

/// 오브젝트 스토리지 클라이언트
pub trait ObjectStoreClient: Send + Sync {
    /// 오브젝트 하나를 업로드합니다.
    fn put_object(&self, request: PutObject) -> BoxFuture<'_, Result<(), OutputError>>;
}

/// S3 출력 behavior
pub struct S3Behavior {
    key: String,
    bucket: String,
    region: Option<String>,
    settings: S3Config,
    client: Arc<dyn ObjectStoreClient>,
    renderer: Arc<Renderer>,
    stats: StatsHandle,
}

fn parse_destination(destination: &str) -> Result<(Option<String>, String), OutputError> {
    let (region, bucket) = match destination.split_once(':') {
        Some((region, bucket)) => (Some(region.to_owned()), bucket),
        None => (None, destination),
    };
    if bucket.is_empty() {
        return Err(OutputError::Configuration(format!(
            "s3 destination '{destination}' has no bucket"
        )));
    }
    if region.as_deref() == Some("") {
        return Err(OutputError::Configuration(format!(
            "s3 destination '{destination}' has an empty region"
        )));
    }
    Ok((region, bucket.to_owned()))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

impl S3Behavior {
    /// 설정에서 AWS 클라이언트를 만들어 초기화합니다.
    pub async fn initialize(destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let (region, _) = parse_destination(destination)?;
        let client = aws::connect(region.as_deref(), &config.output.s3).await?;
        Self::with_client(destination, config, client)
    }

    /// 주어진 클라이언트로 초기화합니다.
    pub fn with_client(
        destination: &str,
        config: &ForwarderConfig,
        client: Arc<dyn ObjectStoreClient>,
    ) -> Result<Self, OutputError> {
        let (region, bucket) = parse_destination(destination)?;
        Ok(Self {
            key: destination.to_owned(),
            bucket,
            region,
            settings: config.output.s3.clone(),
            client,
            renderer: Arc::new(Renderer::lines()),
            stats: StatsHandle::new(destination, OutputKind::S3),
        })
    }

    /// 번들의 오브젝트 키를 계산합니다.
    pub fn object_key(&self, name: &str, bundle: &Bundle) -> String {
        let mut key = self.settings.object_prefix.clone();
        if self.settings.verbose_key {
            let created: DateTime<Utc> = bundle.created_at().into();
            key.push_str(&created.format("%Y/%m/%d/").to_string());
        }
        key.push_str(name);
        if self.settings.compress_data {
            key.push_str(".gz");
        }
        key
    }

    async fn spool_and_put(&self, name: &str, bundle: &Bundle) -> Result<(u64, u64), OutputError> {
        let spool = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(spool.reopen()?);
        let compress = self.settings.compress_data;

        let (bytes, summary) = stream_bundle(&self.renderer, name, bundle, |reader| async move {
            let mut reader = reader.into_async_read();
            let copied = if compress {
                copy_gzip(&mut reader, &mut file).await
            } else {
                copy_plain(&mut reader, &mut file).await
            };
            copied.map_err(OutputError::transmission)
        })
        .await?;

        let key = self.object_key(name, bundle);
        let request = PutObject {
            bucket: self.bucket.clone(),
            key: key.clone(),
            body: spool.path().to_path_buf(),
            content_length: bytes,
            content_encoding: compress.then(|| "gzip".to_owned()),
            acl: non_empty(&self.settings.acl_policy),
            server_side_encryption: non_empty(&self.settings.server_side_encryption),
        };
        self.client.put_object(request).await?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes, "object uploaded");
        self.stats.stats().record_object(key);
        Ok((summary.records, bytes))
    }
}

impl Behavior for S3Behavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        match &self.region {
            Some(region) => format!("s3://{}/{} ({region})", self.bucket, self.settings.object_prefix),
            None => format!("s3://{}/{}", self.bucket, self.settings.object_prefix),
        }
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        match self.spool_and_put(name, bundle).await {
            Ok((records, bytes)) => {
                self.stats.stats().record_upload(records, bytes);
                UploadStatus::success(name, records, bytes)
            }
            Err(err) => UploadStatus::failure(name, err),
        }
    }
}

// ─── AWS SDK 구현 ──────────────────────────────────────────────────

#[cfg(feature = "s3")]
mod aws {
    use std::sync::Arc;

    use aws_sdk_s3::Client;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};

    use evfwd_core::BoxFuture;
    use evfwd_core::config::S3Config;

    use super::{ObjectStoreClient, PutObject};
    use crate::error::OutputError;

    /// AWS SDK 기반 클라이언트
    pub struct AwsObjectStore {
        client: Client,
    }

    pub async fn connect(
        region: Option<&str>,
        settings: &S3Config,
    ) -> Result<Arc<dyn ObjectStoreClient>, OutputError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_owned()));
        }
        if !settings.credential_profile.is_empty() {
            loader = loader.profile_name(&settings.credential_profile);
        }
        let aws_config = loader.load().await;
        let client = Client::from_conf(aws_sdk_s3::config::Builder::from(&aws_config).build());
        Ok(Arc::new(AwsObjectStore { client }))
    }

    /// 알려진 canned ACL만 매핑합니다.
    pub(super) fn canned_acl(value: &str) -> Option<ObjectCannedAcl> {
        if ObjectCannedAcl::values().contains(&value) {
            Some(ObjectCannedAcl::from(value))
        } else {
            tracing::warn!(acl = value, "unknown s3 canned acl ignored");
            None
        }
    }

    /// 알려진 서버 측 암호화 방식만 매핑합니다.
    pub(super) fn encryption(value: &str) -> Option<ServerSideEncryption> {
        if ServerSideEncryption::values().contains(&value) {
            Some(ServerSideEncryption::from(value))
        } else {
            tracing::warn!(sse = value, "unknown s3 server side encryption ignored");
            None
        }
    }

    impl ObjectStoreClient for AwsObjectStore {
        fn put_object(&self, request: PutObject) -> BoxFuture<'_, Result<(), OutputError>> {
            Box::pin(async move {
                let body = ByteStream::from_path(&request.body)
                    .await
                    .map_err(|e| OutputError::transmission(format!("spool read failed: {e}")))?;

                let mut put = self
                    .client
                    .put_object()
                    .bucket(&request.bucket)
                    .key(&request.key)
                    .content_length(i64::try_from(request.content_length).unwrap_or(i64::MAX))
                    .body(body);

                if let Some(encoding) = &request.content_encoding {
                    put = put.content_encoding(encoding);
                }
                if let Some(acl) = request.acl.as_deref().and_then(canned_acl) {
                    put = put.acl(acl);
                }
                if let Some(sse) = request.server_side_encryption.as_deref().and_then(encryption) {
                    put = put.server_side_encryption(sse);
                }

                put.send()
                    .await
                    .map_err(|e| OutputError::transmission(format!("put_object failed: {e}")))?;
                Ok(())
            })
        }
    }
}

#[cfg(not(feature = "s3"))]
mod aws {
    use std::sync::Arc;

    use evfwd_core::config::S3Config;

    use super::ObjectStoreClient;
    use crate::error::OutputError;

    pub async fn connect(
        _region: Option<&str>,
        _settings: &S3Config,
    ) -> Result<Arc<dyn ObjectStoreClient>, OutputError> {
        Err(OutputError::Configuration(
            "s3 output requires evfwd-output to be built with the `s3` feature".to_owned(),
        ))
    }
}
