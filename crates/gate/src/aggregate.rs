//! 심각도 집계 — 취약점 목록을 버킷별로 집계
//!
//! `UNKNOWN`은 항상 별도 버킷으로 집계됩니다. 다른 등급에 합산하거나
//! 버리지 않으므로 집계 합은 항상 입력 취약점 수와 같습니다.

use imagegate_core::types::{SeverityCounts, Vulnerability};

/// 취약점 목록에서 심각도별 집계를 계산합니다.
pub fn aggregate(vulnerabilities: &[Vulnerability]) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for vuln in vulnerabilities {
        counts.record(vuln.severity);
    }
    counts
}
