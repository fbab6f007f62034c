//! 게이트 판정 — 집계와 임계값으로 빌드 통과 여부 결정
//!
//! [`decide`]는 순수 함수입니다: 임계값 이상의 버킷에 취약점이 하나라도
//! 있으면 실패입니다. `UNKNOWN` 버킷은 집계에는 포함되지만 판정에는
//! 참여하지 않습니다.
//!
//! [`evaluate`]는 예외 해소 -> 집계 -> 판정의 전체 흐름을 수행합니다.
//! 성공하지 못한 스캔(실패/타임아웃)은 항상 빌드 실패입니다
//! (fail-safe-closed).

use std::time::SystemTime;

use tracing::info;

use imagegate_core::types::{
    Exception, GateDecision, GateThreshold, ScanResult, ScanStatus, Severity, SeverityCounts,
};

use crate::aggregate::aggregate;
use crate::resolver::resolve;

/// 집계와 임계값으로 빌드 실패 여부를 판정합니다.
///
/// 임계값이 가리키는 최소 심각도 이상의 버킷 중 하나라도 0이 아니면
/// `true`(빌드 실패)를 반환합니다.
pub fn decide(counts: &SeverityCounts, threshold: GateThreshold) -> bool {
    let min = threshold.min_severity();
    [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ]
    .into_iter()
    .filter(|severity| *severity >= min)
    .any(|severity| counts.get(severity) > 0)
}

/// 스캔 결과에 예외를 적용하고 게이트 판정을 계산합니다.
///
/// 판정 시각 `at`을 인자로 받는 순수 함수이므로 저장된 스캔에 대해
/// 현재 예외 집합으로 언제든 재판정할 수 있습니다.
///
/// 성공하지 못한 스캔은 취약점 정보와 무관하게 빌드 실패로 판정합니다.
pub fn evaluate(
    scan: &ScanResult,
    exceptions: &[Exception],
    threshold: GateThreshold,
    at: SystemTime,
) -> GateDecision {
    // fail-safe-closed: 결과를 신뢰할 수 없는 스캔은 통과시키지 않음
    if scan.status != ScanStatus::Success {
        return GateDecision {
            scan_id: scan.id.clone(),
            should_fail_build: true,
            threshold,
            effective_counts: SeverityCounts::default(),
            excepted_count: 0,
            evaluated_at: at,
        };
    }

    let resolution = resolve(&scan.vulnerabilities, &scan.image_name, exceptions, at);
    let effective_counts = aggregate(&resolution.retained);
    let should_fail_build = decide(&effective_counts, threshold);

    info!(
        scan_id = scan.id.as_str(),
        image = scan.image_name.as_str(),
        %threshold,
        fail = should_fail_build,
        excepted = resolution.excepted_count(),
        "gate decision evaluated"
    );

    GateDecision {
        scan_id: scan.id.clone(),
        should_fail_build,
        threshold,
        effective_counts,
        excepted_count: resolution.excepted_count(),
        evaluated_at: at,
    }
}
