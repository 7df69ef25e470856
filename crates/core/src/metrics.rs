//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logtally_`
//! - 모듈명: `monitor_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use logtally_core::metrics as m;
//!
//! metrics::counter!(m::MONITOR_LINES_READ_TOTAL, m::LABEL_MONITOR => "app").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 모니터 이름 레이블 키
pub const LABEL_MONITOR: &str = "monitor";

// ─── Monitor 메트릭 ────────────────────────────────────────────────

/// Monitor: 읽어 들인 완성 라인 수 (counter, label: monitor)
pub const MONITOR_LINES_READ_TOTAL: &str = "logtally_monitor_lines_read_total";

/// Monitor: 읽어 들인 바이트 수 (counter, label: monitor)
pub const MONITOR_BYTES_READ_TOTAL: &str = "logtally_monitor_bytes_read_total";

/// Monitor: 규칙 매칭 수 (counter, label: monitor)
pub const MONITOR_RULE_MATCHES_TOTAL: &str = "logtally_monitor_rule_matches_total";

/// Monitor: 파일 열기/읽기 실패 수 (counter, label: monitor)
pub const MONITOR_READ_ERRORS_TOTAL: &str = "logtally_monitor_read_errors_total";

/// Monitor: 한 번의 읽기 사이클 소요 시간 (histogram, 초)
pub const MONITOR_CYCLE_DURATION_SECONDS: &str = "logtally_monitor_cycle_duration_seconds";

/// Monitor: 레지스트리에 등록된 모니터 수 (gauge)
pub const MONITORS_ACTIVE: &str = "logtally_monitors_active";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logtally_daemon_uptime_seconds";

/// Daemon: 설정 리로드 수 (counter, label: result)
pub const DAEMON_CONFIG_RELOADS_TOTAL: &str = "logtally_daemon_config_reloads_total";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        MONITOR_LINES_READ_TOTAL,
        "Total number of complete lines read from monitored files"
    );
    describe_counter!(
        MONITOR_BYTES_READ_TOTAL,
        "Total number of bytes read from monitored files"
    );
    describe_counter!(
        MONITOR_RULE_MATCHES_TOTAL,
        "Total number of rule matches across all monitors"
    );
    describe_counter!(
        MONITOR_READ_ERRORS_TOTAL,
        "Total number of failed open or read attempts"
    );
    describe_histogram!(
        MONITOR_CYCLE_DURATION_SECONDS,
        "Time spent in a single read-and-evaluate cycle in seconds"
    );
    describe_gauge!(MONITORS_ACTIVE, "Number of monitors currently registered");

    describe_gauge!(DAEMON_UPTIME_SECONDS, "logtally daemon uptime in seconds");
    describe_counter!(
        DAEMON_CONFIG_RELOADS_TOTAL,
        "Configuration reload attempts by result"
    );
}
