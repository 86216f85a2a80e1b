//! Kafka 출력
//!
//! 레코드 하나를 메시지 하나로 발행합니다.
//! 토픽은 `<라우팅 키 또는 "events"><topic_suffix>`, 메시지 키는 번들 이름입니다.
//!
//! 프로듀서는 [`QueueProducer`] trait 뒤에 있으며 librdkafka 구현은
//! `kafka` feature로 컴파일됩니다.

use std::sync::Arc;

use evfwd_core::BoxFuture;
use evfwd_core::config::ForwarderConfig;
use evfwd_core::types::OutputKind;

use crate::behavior::{Behavior, StatsHandle, UploadStatus};
use crate::bundle::{Bundle, EventRecord};
use crate::error::OutputError;

/// 라우팅 키가 없는 레코드의 토픽
pub const DEFAULT_TOPIC: &str = "events";

/// 발행 확인 정보
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueReceipt {
    /// 저장된 파티션
    pub partition: Option<i32>,
    /// 저장된 오프셋
    pub offset: Option<i64>,
}

/// 파티션 큐 프로듀서
pub trait QueueProducer: Send + Sync {
    /// 메시지 하나를 발행하고 확인을 기다립니다.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, Result<QueueReceipt, OutputError>>;
}

/// Kafka 출력 behavior
pub struct KafkaBehavior {
    key: String,
    topic_suffix: String,
    producer: Arc<dyn QueueProducer>,
    stats: StatsHandle,
}

impl KafkaBehavior {
    /// `output.kafka.brokers`로 프로듀서를 생성합니다.
    pub fn initialize(_destination: &str, config: &ForwarderConfig) -> Result<Self, OutputError> {
        let brokers = &config.output.kafka.brokers;
        if brokers.is_empty() {
            return Err(OutputError::Configuration(
                "kafka output requires output.kafka.brokers".to_owned(),
            ));
        }
        let producer = rdkafka_producer::connect(brokers, config)?;
        Self::with_producer(config, producer)
    }

    /// 주어진 프로듀서로 초기화합니다.
    pub fn with_producer(
        config: &ForwarderConfig,
        producer: Arc<dyn QueueProducer>,
    ) -> Result<Self, OutputError> {
        let brokers = &config.output.kafka.brokers;
        Ok(Self {
            key: brokers.clone(),
            topic_suffix: config.output.kafka.topic_suffix.clone(),
            producer,
            stats: StatsHandle::new(brokers, OutputKind::Kafka),
        })
    }

    /// 레코드의 대상 토픽
    pub fn topic_for(&self, record: &EventRecord) -> String {
        format!(
            "{}{}",
            record.routing_key().unwrap_or(DEFAULT_TOPIC),
            self.topic_suffix
        )
    }

    async fn publish_all(&self, name: &str, bundle: &Bundle) -> Result<(u64, u64), OutputError> {
        let mut bytes = 0u64;
        for record in bundle.records() {
            let topic = self.topic_for(record);
            let receipt = self.producer.publish(&topic, name, record.text()).await?;
            self.stats
                .stats()
                .record_position(receipt.partition, receipt.offset);
            bytes += record.len() as u64;
        }
        Ok((bundle.len() as u64, bytes))
    }
}

impl Behavior for KafkaBehavior {
    fn key(&self) -> &str {
        &self.key
    }

    fn describe(&self) -> String {
        format!("kafka brokers={} topic=*{}", self.key, self.topic_suffix)
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }

    async fn upload(&mut self, name: &str, bundle: &Bundle) -> UploadStatus {
        match self.publish_all(name, bundle).await {
            Ok((records, bytes)) => {
                self.stats.stats().record_upload(records, bytes);
                UploadStatus::success(name, records, bytes)
            }
            Err(err) => UploadStatus::failure(name, err),
        }
    }
}

// ─── librdkafka 구현 ───────────────────────────────────────────────

#[cfg(feature = "kafka")]
mod rdkafka_producer {
    use std::sync::Arc;
    use std::time::Duration;

    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};

    use evfwd_core::BoxFuture;
    use evfwd_core::config::ForwarderConfig;

    use super::{QueueProducer, QueueReceipt};
    use crate::error::OutputError;

    /// librdkafka 기반 프로듀서
    pub struct RdKafkaProducer {
        producer: FutureProducer,
        timeout: Duration,
    }

    pub fn connect(
        brokers: &str,
        config: &ForwarderConfig,
    ) -> Result<Arc<dyn QueueProducer>, OutputError> {
        let timeout = config.connect_timeout();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", &config.general.server_name)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create()
            .map_err(|e| OutputError::Configuration(format!("kafka producer: {e}")))?;
        tracing::info!(brokers, "kafka producer created");
        Ok(Arc::new(RdKafkaProducer { producer, timeout }))
    }

    impl QueueProducer for RdKafkaProducer {
        fn publish<'a>(
            &'a self,
            topic: &'a str,
            key: &'a str,
            payload: &'a [u8],
        ) -> BoxFuture<'a, Result<QueueReceipt, OutputError>> {
            Box::pin(async move {
                let record = FutureRecord::to(topic).payload(payload).key(key);
                let delivery = self
                    .producer
                    .send(record, self.timeout)
                    .await
                    .map_err(|(e, _)| OutputError::transmission(format!("kafka publish: {e}")))?;
                Ok(QueueReceipt {
                    partition: Some(delivery.partition),
                    offset: Some(delivery.offset),
                })
            })
        }
    }
}

#[cfg(not(feature = "kafka"))]
mod rdkafka_producer {
    use std::sync::Arc;

    use evfwd_core::config::ForwarderConfig;

    use super::QueueProducer;
    use crate::error::OutputError;

    pub fn connect(
        _brokers: &str,
        _config: &ForwarderConfig,
    ) -> Result<Arc<dyn QueueProducer>, OutputError> {
        Err(OutputError::Configuration(
            "kafka output requires evfwd-output to be built with the `kafka` feature".to_owned(),
        ))
    }
}
