//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 출력 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! evfwd 자체는 exporter를 설치하지 않습니다. 레코더가 없으면 매크로 호출은
//! 아무 동작도 하지 않으며, 임베딩하는 애플리케이션이 원하는 레코더를 설치할 수 있습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `evfwd_`
//! - 모듈명: `output_`, `forwarder_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(evfwd_core::metrics::OUTPUT_BUNDLES_UPLOADED_TOTAL,
//!     evfwd_core::metrics::LABEL_DESTINATION => "https://collector/events").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 목적지 레이블 키 (destination key)
pub const LABEL_DESTINATION: &str = "destination";

/// 번들 봉인 사유 레이블 키 (size, timer, shutdown)
pub const LABEL_TRIGGER: &str = "trigger";

// ─── Forwarder 메트릭 ───────────────────────────────────────────────

/// Forwarder: append된 레코드 수 (counter)
pub const FORWARDER_RECORDS_APPENDED_TOTAL: &str = "evfwd_forwarder_records_appended_total";

/// Forwarder: 봉인된 번들 수 (counter, label: trigger)
pub const FORWARDER_BUNDLES_SEALED_TOTAL: &str = "evfwd_forwarder_bundles_sealed_total";

// ─── Output 메트릭 ──────────────────────────────────────────────────

/// Output: 업로드 성공 번들 수 (counter, label: destination)
pub const OUTPUT_BUNDLES_UPLOADED_TOTAL: &str = "evfwd_output_bundles_uploaded_total";

/// Output: 업로드 실패 번들 수 (counter, label: destination)
pub const OUTPUT_BUNDLES_FAILED_TOTAL: &str = "evfwd_output_bundles_failed_total";

/// Output: 건너뛴 빈 번들 수 (counter, label: destination)
pub const OUTPUT_EMPTY_BUNDLES_SKIPPED_TOTAL: &str = "evfwd_output_empty_bundles_skipped_total";

/// Output: 전달된 레코드 수 (counter, label: destination)
pub const OUTPUT_RECORDS_DELIVERED_TOTAL: &str = "evfwd_output_records_delivered_total";

/// Output: 전달된 바이트 수 (counter, label: destination)
pub const OUTPUT_BYTES_DELIVERED_TOTAL: &str = "evfwd_output_bytes_delivered_total";

/// Output: 번들 업로드 소요 시간 (histogram, 초)
pub const OUTPUT_UPLOAD_DURATION_SECONDS: &str = "evfwd_output_upload_duration_seconds";

/// Output: 전달 대기 중인 번들 수 (gauge, label: destination)
pub const OUTPUT_QUEUE_DEPTH: &str = "evfwd_output_queue_depth";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Forwarder
    describe_counter!(
        FORWARDER_RECORDS_APPENDED_TOTAL,
        "Total number of event records appended to bundle buffers"
    );
    describe_counter!(
        FORWARDER_BUNDLES_SEALED_TOTAL,
        "Total number of bundles sealed, by trigger (size, timer, shutdown)"
    );

    // Output
    describe_counter!(
        OUTPUT_BUNDLES_UPLOADED_TOTAL,
        "Total number of bundles delivered successfully"
    );
    describe_counter!(
        OUTPUT_BUNDLES_FAILED_TOTAL,
        "Total number of bundle uploads that failed"
    );
    describe_counter!(
        OUTPUT_EMPTY_BUNDLES_SKIPPED_TOTAL,
        "Total number of empty bundles dropped because empty uploads are disabled"
    );
    describe_counter!(
        OUTPUT_RECORDS_DELIVERED_TOTAL,
        "Total number of event records delivered"
    );
    describe_counter!(
        OUTPUT_BYTES_DELIVERED_TOTAL,
        "Total number of event bytes delivered"
    );
    describe_histogram!(
        OUTPUT_UPLOAD_DURATION_SECONDS,
        "Time to upload a single bundle in seconds"
    );
    describe_gauge!(
        OUTPUT_QUEUE_DEPTH,
        "Number of sealed bundles waiting for delivery"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        FORWARDER_RECORDS_APPENDED_TOTAL,
        FORWARDER_BUNDLES_SEALED_TOTAL,
        OUTPUT_BUNDLES_UPLOADED_TOTAL,
        OUTPUT_BUNDLES_FAILED_TOTAL,
        OUTPUT_EMPTY_BUNDLES_SKIPPED_TOTAL,
        OUTPUT_RECORDS_DELIVERED_TOTAL,
        OUTPUT_BYTES_DELIVERED_TOTAL,
        OUTPUT_UPLOAD_DURATION_SECONDS,
        OUTPUT_QUEUE_DEPTH,
    ];

    #[test]
    fn all_metrics_start_with_evfwd_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("evfwd_"),
                "Metric '{}' does not start with 'evfwd_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES
            .iter()
            .filter(|n| !n.ends_with("_seconds") && !n.ends_with("_depth"))
        {
            assert!(name.ends_with("_total"), "Counter '{}' lacks _total", name);
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 panic하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_DESTINATION, LABEL_TRIGGER] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
