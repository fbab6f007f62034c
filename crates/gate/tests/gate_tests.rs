//! 게이트 판정 통합 테스트
//!
//! - 임계값 x 버킷 존재 여부 전수 조합 검증
//! - nginx:latest 시나리오 (예외 적용 전후 판정 변화)
//! - 재판정(re-evaluation) 일관성

use std::time::{Duration, SystemTime};

use imagegate_core::types::{
    Exception, GateThreshold, ScanRequest, ScanResult, ScanStatus, Severity, SeverityCounts,
    Vulnerability,
};
use imagegate_gate::{aggregate, decide, evaluate, resolve};

fn vuln(cve: &str, severity: Severity) -> Vulnerability {
    Vulnerability {
        cve_id: cve.to_owned(),
        severity,
        package_name: "openssl".to_owned(),
        package_version: "3.0.2".to_owned(),
        fixed_version: Some("3.0.13".to_owned()),
        description: "test vulnerability".to_owned(),
        cvss_score: Some(8.1),
        references: vec![],
    }
}

fn exception(id: &str, cve: &str, image: Option<&str>) -> Exception {
    let now = SystemTime::now();
    Exception {
        id: id.to_owned(),
        cve_id: cve.to_owned(),
        image_name: image.map(str::to_owned),
        reason: "accepted risk".to_owned(),
        approved_by: "secops".to_owned(),
        approved_at: now,
        expires_at: None,
        is_active: true,
        created_at: now,
    }
}

fn successful_scan(image: &str, vulns: Vec<Vulnerability>) -> ScanResult {
    let request = ScanRequest::new(image, None);
    let mut scan = ScanResult::new(&request, "trivy", "0.50.0");
    scan.status = ScanStatus::Success;
    scan.vulnerabilities = vulns;
    scan
}

// =============================================================================
// 전수 조합: 4개 임계값 x 16개 버킷 존재 조합
// =============================================================================

#[test]
fn decide_exhaustive_threshold_bucket_grid() {
    let thresholds = [
        GateThreshold::Low,
        GateThreshold::Medium,
        GateThreshold::High,
        GateThreshold::Critical,
    ];

    // 비트: critical, high, medium, low 존재 여부
    for mask in 0u8..16 {
        let counts = SeverityCounts {
            critical: u64::from(mask & 0b1000 != 0),
            high: u64::from(mask & 0b0100 != 0),
            medium: u64::from(mask & 0b0010 != 0),
            low: u64::from(mask & 0b0001 != 0),
            unknown: 0,
        };

        for threshold in thresholds {
            let expected = match threshold {
                GateThreshold::Low => counts.gated_total() > 0,
                GateThreshold::Medium => counts.critical + counts.high + counts.medium > 0,
                GateThreshold::High => counts.critical + counts.high > 0,
                GateThreshold::Critical => counts.critical > 0,
            };
            assert_eq!(
                decide(&counts, threshold),
                expected,
                "mask={mask:04b} threshold={threshold}"
            );
        }
    }
}

#[test]
fn decide_unknown_bucket_never_affects_grid() {
    // 전수 조합에 unknown을 더해도 판정은 변하지 않음
    for mask in 0u8..16 {
        let mut counts = SeverityCounts {
            critical: u64::from(mask & 0b1000 != 0),
            high: u64::from(mask & 0b0100 != 0),
            medium: u64::from(mask & 0b0010 != 0),
            low: u64::from(mask & 0b0001 != 0),
            unknown: 0,
        };
        for threshold in [
            GateThreshold::Low,
            GateThreshold::Medium,
            GateThreshold::High,
            GateThreshold::Critical,
        ] {
            let without_unknown = decide(&counts, threshold);
            counts.unknown = 42;
            let with_unknown = decide(&counts, threshold);
            counts.unknown = 0;
            assert_eq!(without_unknown, with_unknown);
        }
    }
}

// =============================================================================
// nginx:latest 시나리오
// =============================================================================

#[test]
fn nginx_with_one_critical_fails_at_high_threshold() {
    let scan = successful_scan(
        "nginx",
        vec![
            vuln("CVE-2023-44487", Severity::High),
            vuln("CVE-2023-38545", Severity::Critical),
            vuln("CVE-2023-0001", Severity::Low),
        ],
    );
    let decision = evaluate(&scan, &[], GateThreshold::High, SystemTime::now());
    assert!(decision.should_fail_build);
    assert_eq!(decision.effective_counts.critical, 1);
    assert_eq!(decision.effective_counts.high, 1);
    assert_eq!(decision.effective_counts.low, 1);
    assert_eq!(decision.excepted_count, 0);
}

#[test]
fn nginx_passes_after_excepting_the_gating_vulnerabilities() {
    let scan = successful_scan(
        "nginx",
        vec![
            vuln("CVE-2023-44487", Severity::High),
            vuln("CVE-2023-38545", Severity::Critical),
            vuln("CVE-2023-0001", Severity::Low),
        ],
    );
    let exceptions = vec![
        exception("exc-1", "CVE-2023-44487", Some("nginx")),
        exception("exc-2", "CVE-2023-38545", None),
    ];

    let decision = evaluate(&scan, &exceptions, GateThreshold::High, SystemTime::now());
    assert!(!decision.should_fail_build);
    assert_eq!(decision.excepted_count, 2);
    // LOW는 남아 있지만 HIGH 임계값에는 걸리지 않음
    assert_eq!(decision.effective_counts.low, 1);
    assert_eq!(decision.effective_counts.gated_total(), 1);
}

#[test]
fn nginx_exception_scoped_to_other_image_does_not_apply() {
    let scan = successful_scan("nginx", vec![vuln("CVE-2023-38545", Severity::Critical)]);
    let exceptions = vec![exception("exc-1", "CVE-2023-38545", Some("redis"))];

    let decision = evaluate(&scan, &exceptions, GateThreshold::High, SystemTime::now());
    assert!(decision.should_fail_build);
    assert_eq!(decision.excepted_count, 0);
}

#[test]
fn nginx_expired_exception_no_longer_passes_the_gate() {
    let now = SystemTime::now();
    let scan = successful_scan("nginx", vec![vuln("CVE-2023-38545", Severity::Critical)]);
    let mut exc = exception("exc-1", "CVE-2023-38545", None);
    exc.expires_at = Some(now + Duration::from_secs(3600));

    // 만료 전: 통과
    let before = evaluate(
        &scan,
        std::slice::from_ref(&exc),
        GateThreshold::High,
        now,
    );
    assert!(!before.should_fail_build);

    // 만료 후 재판정: 실패
    let after = evaluate(
        &scan,
        std::slice::from_ref(&exc),
        GateThreshold::High,
        now + Duration::from_secs(7200),
    );
    assert!(after.should_fail_build);
}

#[test]
fn nginx_zero_vulnerabilities_is_a_pass_even_at_low_threshold() {
    let scan = successful_scan("nginx", vec![]);
    let decision = evaluate(&scan, &[], GateThreshold::Low, SystemTime::now());
    assert!(!decision.should_fail_build);
    assert_eq!(decision.effective_counts.total(), 0);
}

#[test]
fn nginx_unknown_severity_is_surfaced_but_does_not_gate() {
    let scan = successful_scan(
        "nginx",
        vec![
            vuln("CVE-2024-0001", Severity::Unknown),
            vuln("CVE-2024-0002", Severity::Unknown),
        ],
    );
    let decision = evaluate(&scan, &[], GateThreshold::Low, SystemTime::now());
    assert!(!decision.should_fail_build);
    // 집계에는 보존됨
    assert_eq!(decision.effective_counts.unknown, 2);
}

// =============================================================================
// 재판정 일관성
// =============================================================================

#[test]
fn re_evaluation_with_same_inputs_is_identical() {
    let at = SystemTime::now();
    let scan = successful_scan(
        "nginx",
        vec![
            vuln("CVE-1", Severity::High),
            vuln("CVE-2", Severity::Medium),
        ],
    );
    let exceptions = vec![exception("exc-1", "CVE-1", None)];

    let first = evaluate(&scan, &exceptions, GateThreshold::Medium, at);
    let second = evaluate(&scan, &exceptions, GateThreshold::Medium, at);
    assert_eq!(first.should_fail_build, second.should_fail_build);
    assert_eq!(first.effective_counts, second.effective_counts);
    assert_eq!(first.excepted_count, second.excepted_count);
}

#[test]
fn re_evaluation_with_new_exception_flips_the_verdict() {
    let at = SystemTime::now();
    let scan = successful_scan("nginx", vec![vuln("CVE-1", Severity::Critical)]);

    let before = evaluate(&scan, &[], GateThreshold::High, at);
    assert!(before.should_fail_build);

    let exceptions = vec![exception("exc-1", "CVE-1", None)];
    let after = evaluate(&scan, &exceptions, GateThreshold::High, at);
    assert!(!after.should_fail_build);
}

#[test]
fn resolve_then_aggregate_conserves_vulnerability_count() {
    let at = SystemTime::now();
    let vulns = vec![
        vuln("CVE-1", Severity::Critical),
        vuln("CVE-2", Severity::High),
        vuln("CVE-3", Severity::Unknown),
        vuln("CVE-4", Severity::Low),
    ];
    let exceptions = vec![exception("exc-1", "CVE-2", None)];

    let resolution = resolve(&vulns, "nginx", &exceptions, at);
    let counts = aggregate(&resolution.retained);
    assert_eq!(
        counts.total() + resolution.excepted_count(),
        vulns.len() as u64
    );
}
