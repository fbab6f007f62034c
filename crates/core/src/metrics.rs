//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `imagegate_`
//! - 모듈명: `scanner_`, `gate_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use imagegate_core::metrics;
//! use metrics::counter;
//!
//! counter!(imagegate_core::metrics::SCANNER_SCANS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (unknown, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 스캔 상태 레이블 키 (success, failed, timeout)
pub const LABEL_STATUS: &str = "status";

/// 스캐너 백엔드 레이블 키 (trivy, clair)
pub const LABEL_BACKEND: &str = "backend";

/// 결과 레이블 키 (pass, fail)
pub const LABEL_RESULT: &str = "result";

// ─── Scanner 메트릭 ────────────────────────────────────────────────

/// Scanner: 완료된 스캔 수 (counter, labels: backend, status)
pub const SCANNER_SCANS_TOTAL: &str = "imagegate_scanner_scans_total";

/// Scanner: 스캔 소요 시간 (histogram, 초, label: backend)
pub const SCANNER_SCAN_DURATION_SECONDS: &str = "imagegate_scanner_scan_duration_seconds";

/// Scanner: 발견된 취약점 수 (counter, label: severity)
pub const SCANNER_VULNERABILITIES_FOUND_TOTAL: &str =
    "imagegate_scanner_vulnerabilities_found_total";

/// Scanner: 현재 진행 중인 스캔 수 (gauge)
pub const SCANNER_SCANS_IN_FLIGHT: &str = "imagegate_scanner_scans_in_flight";

// ─── Gate 메트릭 ────────────────────────────────────────────────────

/// Gate: 게이트 판정 수 (counter, label: result)
pub const GATE_DECISIONS_TOTAL: &str = "imagegate_gate_decisions_total";

/// Gate: 예외로 제외된 취약점 수 (counter)
pub const GATE_EXCEPTED_VULNERABILITIES_TOTAL: &str =
    "imagegate_gate_excepted_vulnerabilities_total";

/// Gate: 현재 활성 예외 수 (gauge)
pub const GATE_EXCEPTIONS_ACTIVE: &str = "imagegate_gate_exceptions_active";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "imagegate_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version, commit, rust_version)
pub const DAEMON_BUILD_INFO: &str = "imagegate_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 스캔 소요 시간 히스토그램 버킷 (초)
///
/// 1s ~ 600s 범위 (이미지 스캔은 레이어 다운로드와 DB 조회 포함)
pub const SCAN_DURATION_BUCKETS: [f64; 9] =
    [1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`, `describe_histogram!()`을
/// 호출하여 Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `imagegate-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Scanner
    describe_counter!(
        SCANNER_SCANS_TOTAL,
        "Total number of image scans completed, by backend and terminal status"
    );
    describe_histogram!(
        SCANNER_SCAN_DURATION_SECONDS,
        "Time to complete a single image scan in seconds"
    );
    describe_counter!(
        SCANNER_VULNERABILITIES_FOUND_TOTAL,
        "Total number of vulnerabilities found, by severity"
    );
    describe_gauge!(
        SCANNER_SCANS_IN_FLIGHT,
        "Number of scans currently running"
    );

    // Gate
    describe_counter!(
        GATE_DECISIONS_TOTAL,
        "Total number of gate decisions, by result (pass, fail)"
    );
    describe_counter!(
        GATE_EXCEPTED_VULNERABILITIES_TOTAL,
        "Total number of vulnerabilities excluded by approved exceptions"
    );
    describe_gauge!(
        GATE_EXCEPTIONS_ACTIVE,
        "Number of currently active vulnerability exceptions"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Imagegate daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version/commit labels)"
    );
}
