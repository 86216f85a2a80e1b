//! 번들 데이터 모델 -- 이벤트 레코드, 봉인된 번들, 누적 버퍼
//!
//! - [`EventRecord`]: 이미 직렬화된 이벤트 하나 (불변)
//! - [`BundleBuffer`]: 목적지 키 하나의 누적 버퍼. 봉인 시 비워지고 재사용됨
//! - [`Bundle`]: 봉인된 불변 번들. 복제 비용이 낮고 전달 이후 폐기됨
//! - [`RecordSource`]: 업로드 한 번 동안 레코드를 하나씩 렌더러에 넘기는 커서

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::OutputError;

/// 직렬화된 이벤트 레코드
///
/// `text`는 JSON/LEEF로 이미 인코딩된 이벤트 한 건입니다.
/// `ordinal`은 번들 내 위치이며 [`BundleBuffer::push`]에서 부여됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    ordinal: u64,
    text: Bytes,
    routing_key: Option<String>,
}

impl EventRecord {
    /// 새 레코드를 생성합니다.
    pub fn new(text: impl Into<Bytes>) -> Self {
        Self {
            ordinal: 0,
            text: text.into(),
            routing_key: None,
        }
    }

    /// 상위 메시지 버스의 라우팅 키를 지정합니다.
    ///
    /// Kafka 출력만 이 값을 토픽 이름에 사용합니다.
    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// 번들 내 위치
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// 직렬화된 이벤트 바이트
    pub fn text(&self) -> &Bytes {
        &self.text
    }

    /// 라우팅 키
    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    /// 바이트 길이
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// 봉인된 번들
///
/// 한 번 생성되면 변경되지 않습니다. 레코드는 `Arc<[EventRecord]>`로 공유되므로
/// 복제는 참조 카운트 증가뿐입니다.
#[derive(Debug, Clone)]
pub struct Bundle {
    name: String,
    key: String,
    records: Arc<[EventRecord]>,
    byte_size: u64,
    created_at: SystemTime,
}

impl Bundle {
    /// 번들 이름 (업로드 파일명/오브젝트 키에 사용)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 대상 목적지 키
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 순서가 보존된 레코드
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 빈 번들인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 레코드 바이트 길이의 합
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// 누적이 시작된 벽시계 시각
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// 레코드를 처음부터 하나씩 넘기는 커서를 생성합니다.
    pub fn cursor(&self) -> BundleCursor {
        BundleCursor {
            records: Arc::clone(&self.records),
            position: 0,
        }
    }
}

/// 목적지 키 하나의 누적 버퍼
///
/// 상태 전이: Empty (열리지 않음) → Accumulating (첫 push) → seal → Empty.
/// 내부 `Vec`은 봉인 후에도 용량을 유지한 채 재사용됩니다.
#[derive(Debug)]
pub struct BundleBuffer {
    key: String,
    records: Vec<EventRecord>,
    byte_size: u64,
    opened: Option<SystemTime>,
    total_received: u64,
}

impl BundleBuffer {
    /// 새 누적 버퍼를 생성합니다.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            records: Vec::new(),
            byte_size: 0,
            opened: None,
            total_received: 0,
        }
    }

    /// 레코드를 추가하고 누적 바이트 크기를 반환합니다.
    ///
    /// 버퍼가 열려 있지 않으면 현재 시각으로 엽니다.
    pub fn push(&mut self, mut record: EventRecord) -> u64 {
        if self.opened.is_none() {
            self.opened = Some(SystemTime::now());
        }
        record.ordinal = self.records.len() as u64;
        self.byte_size += record.len() as u64;
        self.records.push(record);
        self.total_received += 1;
        self.byte_size
    }

    /// 버퍼를 불변 번들로 봉인하고 Empty 상태로 되돌립니다.
    ///
    /// 열리지 않은 버퍼를 봉인하면 현재 시각의 빈 번들이 만들어집니다.
    pub fn seal(&mut self, name: impl Into<String>) -> Bundle {
        let created_at = self.opened.take().unwrap_or_else(SystemTime::now);
        let records: Arc<[EventRecord]> = self.records.drain(..).collect();
        let byte_size = std::mem::take(&mut self.byte_size);

        Bundle {
            name: name.into(),
            key: self.key.clone(),
            records,
            byte_size,
            created_at,
        }
    }

    /// 목적지 키
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 버퍼가 열려 있는지 (Accumulating 상태인지) 확인합니다.
    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    /// 버퍼가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 현재 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 현재 누적 바이트 크기
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// 지금까지 유입된 레코드 수
    pub fn total_received(&self) -> u64 {
        self.total_received
    }
}

/// 렌더러에 레코드를 하나씩 공급하는 소스
///
/// 봉인된 번들 외에도 디스크 스풀 파일처럼 읽기 실패가 가능한 소스를
/// 같은 렌더러로 처리하기 위한 확장 지점입니다. 소스 에러는 업로드를 중단시키고
/// 바이트 파이프의 읽기 측에 에러로 전달됩니다.
pub trait RecordSource: Send {
    /// 다음 레코드를 반환합니다. 끝에 도달하면 `None`입니다.
    fn next_record(&mut self) -> impl Future<Output = Result<Option<EventRecord>, OutputError>> + Send;
}

/// 봉인된 번들을 순서대로 읽는 커서
#[derive(Debug, Clone)]
pub struct BundleCursor {
    records: Arc<[EventRecord]>,
    position: usize,
}

impl BundleCursor {
    /// 남은 레코드 수
    pub fn remaining(&self) -> usize {
        self.records.len() - self.position
    }
}

impl RecordSource for BundleCursor {
    async fn next_record(&mut self) -> Result<Option<EventRecord>, OutputError> {
        let record = self.records.get(self.position).cloned();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tracks_byte_size_and_ordinals() {
        let mut buf = BundleBuffer::new("dest");
        assert!(!buf.is_open());
        assert_eq!(buf.push(EventRecord::new("AAAA")), 4);
        assert_eq!(buf.push(EventRecord::new("BBBB")), 8);
        assert!(buf.is_open());
        assert_eq!(buf.len(), 2);

        let bundle = buf.seal("b1");
        assert_eq!(bundle.records()[0].ordinal(), 0);
        assert_eq!(bundle.records()[1].ordinal(), 1);
    }

    #[test]
    fn seal_resets_buffer() {
        let mut buf = BundleBuffer::new("dest");
        buf.push(EventRecord::new("one"));
        buf.push(EventRecord::new("two"));

        let bundle = buf.seal("bundle-1");
        assert_eq!(bundle.name(), "bundle-1");
        assert_eq!(bundle.key(), "dest");
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.byte_size(), 6);

        assert!(buf.is_empty());
        assert!(!buf.is_open());
        assert_eq!(buf.byte_size(), 0);

        // 다음 누적은 이전 레코드 없이 시작
        buf.push(EventRecord::new("three"));
        let next = buf.seal("bundle-2");
        assert_eq!(next.len(), 1);
        assert_eq!(next.records()[0].ordinal(), 0);
        assert_eq!(buf.total_received(), 3);
    }

    #[test]
    fn seal_unopened_buffer_gives_empty_bundle() {
        let mut buf = BundleBuffer::new("dest");
        let bundle = buf.seal("empty");
        assert!(bundle.is_empty());
        assert_eq!(bundle.byte_size(), 0);
    }

    #[test]
    fn bundle_clone_shares_records() {
        let mut buf = BundleBuffer::new("dest");
        buf.push(EventRecord::new("x"));
        let bundle = buf.seal("b");
        let copy = bundle.clone();
        assert!(std::ptr::eq(bundle.records(), copy.records()));
    }

    #[test]
    fn routing_key_is_preserved() {
        let record = EventRecord::new("{}").with_routing_key("watchlist.hit");
        assert_eq!(record.routing_key(), Some("watchlist.hit"));
        assert_eq!(EventRecord::new("{}").routing_key(), None);
    }

    #[tokio::test]
    async fn cursor_yields_records_in_order() {
        let mut buf = BundleBuffer::new("dest");
        for text in ["a", "b", "c"] {
            buf.push(EventRecord::new(text));
        }
        let bundle = buf.seal("b");
        let mut cursor = bundle.cursor();
        assert_eq!(cursor.remaining(), 3);

        let mut seen = Vec::new();
        while let Some(record) = cursor.next_record().await.unwrap() {
            seen.push(record.text().clone());
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.next_record().await.unwrap().is_none());
    }
}
