//! 출력 정규화 — 백엔드별 JSON을 통합 취약점 목록으로 변환
//!
//! 순수 함수로 구성되어 있어 동일 입력에 대해 항상 동일 출력을 반환합니다.
//!
//! # 정규화 규칙
//!
//! - 매핑되지 않는 심각도 라벨은 [`Severity::Unknown`]으로 보존됩니다.
//!   취약점은 어떤 경우에도 버려지지 않습니다.
//! - CVSS 점수가 없으면 `None`입니다. `0.0`으로 대체하지 않습니다.
//! - 파싱 불가능한 출력은 [`ScanError::MalformedOutput`]입니다.
//!   빈 취약점 목록으로 성공 처리되지 않습니다.

use serde::Deserialize;
use tracing::debug;

use imagegate_core::error::ScanError;
use imagegate_core::types::{Severity, Vulnerability};

use crate::backend::RawScanOutput;

/// 원시 스캐너 출력을 정규화된 취약점 목록으로 변환합니다.
pub fn normalize(output: &RawScanOutput) -> Result<Vec<Vulnerability>, ScanError> {
    if output.stdout.trim().is_empty() {
        return Err(ScanError::MalformedOutput(format!(
            "{} produced empty output",
            output.backend
        )));
    }
    let vulns = match output.backend.as_str() {
        "trivy" => normalize_trivy(&output.stdout)?,
        "clair" => normalize_clair(&output.stdout)?,
        other => {
            return Err(ScanError::MalformedOutput(format!(
                "unknown scanner backend '{other}'"
            )));
        }
    };
    debug!(
        backend = output.backend.as_str(),
        count = vulns.len(),
        "normalized scanner output"
    );
    Ok(vulns)
}

// --- trivy ---

/// trivy 출력은 두 가지 형태가 있습니다.
/// 최신 버전은 `{"Results": [...]}`, 구버전은 최상위 배열입니다.
#[derive(Deserialize)]
#[serde(untagged)]
enum TrivyOutput {
    Report(TrivyReport),
    Legacy(Vec<TrivyResult>),
}

#[derive(Deserialize)]
struct TrivyReport {
    #[serde(rename = "Results", default)]
    results: Option<Vec<TrivyResult>>,
}

#[derive(Deserialize)]
struct TrivyResult {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID")]
    vulnerability_id: String,
    #[serde(rename = "PkgName", default)]
    pkg_name: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "References", default)]
    references: Vec<String>,
    #[serde(rename = "CVSS", default)]
    cvss: Option<TrivyCvss>,
}

#[derive(Deserialize, Default)]
struct TrivyCvss {
    #[serde(default)]
    nvd: Option<TrivyCvssEntry>,
    #[serde(default)]
    redhat: Option<TrivyCvssEntry>,
    #[serde(default)]
    ubuntu: Option<TrivyCvssEntry>,
    #[serde(default)]
    debian: Option<TrivyCvssEntry>,
}

#[derive(Deserialize, Default)]
struct TrivyCvssEntry {
    #[serde(rename = "V3Score", default)]
    v3_score: Option<f64>,
    #[serde(rename = "V2Score", default)]
    v2_score: Option<f64>,
}

impl TrivyCvss {
    /// 소스 우선순위 nvd > redhat > ubuntu > debian,
    /// 각 소스 안에서는 V3 > V2를 선택합니다.
    fn best_score(&self) -> Option<f64> {
        [&self.nvd, &self.redhat, &self.ubuntu, &self.debian]
            .into_iter()
            .flatten()
            .find_map(|entry| entry.v3_score.or(entry.v2_score))
    }
}

fn normalize_trivy(stdout: &str) -> Result<Vec<Vulnerability>, ScanError> {
    let output: TrivyOutput = serde_json::from_str(stdout)
        .map_err(|e| ScanError::MalformedOutput(format!("trivy json: {e}")))?;
    let results = match output {
        TrivyOutput::Report(report) => report.results.unwrap_or_default(),
        TrivyOutput::Legacy(results) => results,
    };

    let mut vulns = Vec::new();
    for result in results {
        for raw in result.vulnerabilities.unwrap_or_default() {
            let cvss_score = raw.cvss.as_ref().and_then(TrivyCvss::best_score);
            vulns.push(Vulnerability {
                cve_id: raw.vulnerability_id,
                severity: Severity::from_str_loose(&raw.severity).unwrap_or(Severity::Unknown),
                package_name: raw.pkg_name,
                package_version: raw.installed_version,
                fixed_version: raw.fixed_version.filter(|v| !v.is_empty()),
                description: raw.description,
                cvss_score,
                references: raw.references,
            });
        }
    }
    Ok(vulns)
}

// --- clair ---

#[derive(Deserialize)]
struct ClairReport {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Option<Vec<ClairVulnerability>>,
}

#[derive(Deserialize)]
struct ClairVulnerability {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "PackageName", default)]
    package_name: String,
    #[serde(rename = "PackageVersion", default)]
    package_version: String,
    #[serde(rename = "FixedInVersion", default)]
    fixed_in_version: Option<String>,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Link", default)]
    link: Option<String>,
}

fn normalize_clair(stdout: &str) -> Result<Vec<Vulnerability>, ScanError> {
    let report: ClairReport = serde_json::from_str(stdout)
        .map_err(|e| ScanError::MalformedOutput(format!("clair json: {e}")))?;

    let vulns = report
        .vulnerabilities
        .unwrap_or_default()
        .into_iter()
        .map(|raw| Vulnerability {
            cve_id: raw.name,
            severity: Severity::from_str_loose(&raw.severity).unwrap_or(Severity::Unknown),
            package_name: raw.package_name,
            package_version: raw.package_version,
            fixed_version: raw.fixed_in_version.filter(|v| !v.is_empty()),
            description: raw.description,
            // clair는 CVSS 점수를 보고하지 않음
            cvss_score: None,
            references: raw.link.into_iter().collect(),
        })
        .collect();
    Ok(vulns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn raw(backend: &str, stdout: &str) -> RawScanOutput {
        RawScanOutput {
            backend: backend.to_owned(),
            stdout: stdout.to_owned(),
            stderr: String::new(),
            exit_code: Some(0),
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn trivy_basic_report() {
        let stdout = r#"{
            "Results": [{
                "Target": "nginx:latest",
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2023-44487",
                    "PkgName": "nghttp2",
                    "InstalledVersion": "1.43.0",
                    "FixedVersion": "1.57.0",
                    "Severity": "HIGH",
                    "Description": "HTTP/2 rapid reset",
                    "References": ["https://nvd.nist.gov/vuln/detail/CVE-2023-44487"],
                    "CVSS": {"nvd": {"V3Score": 7.5}}
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].cve_id, "CVE-2023-44487");
        assert_eq!(vulns[0].severity, Severity::High);
        assert_eq!(vulns[0].fixed_version.as_deref(), Some("1.57.0"));
        assert_eq!(vulns[0].cvss_score, Some(7.5));
        assert_eq!(vulns[0].references.len(), 1);
    }

    #[test]
    fn trivy_unmapped_severity_becomes_unknown() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0001",
                    "PkgName": "libfoo",
                    "InstalledVersion": "1.0",
                    "Severity": "SUPERBAD"
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].severity, Severity::Unknown);
    }

    #[test]
    fn trivy_absent_cvss_is_none_not_zero() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0002",
                    "PkgName": "libbar",
                    "InstalledVersion": "2.0",
                    "Severity": "LOW"
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert!(vulns[0].cvss_score.is_none());
    }

    #[test]
    fn trivy_cvss_source_priority() {
        // nvd가 없으면 redhat, 그다음 ubuntu, debian 순서
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0003",
                    "PkgName": "libbaz",
                    "InstalledVersion": "3.0",
                    "Severity": "MEDIUM",
                    "CVSS": {
                        "redhat": {"V3Score": 6.1},
                        "debian": {"V3Score": 5.0}
                    }
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns[0].cvss_score, Some(6.1));
    }

    #[test]
    fn trivy_cvss_v3_preferred_over_v2() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0004",
                    "PkgName": "libqux",
                    "InstalledVersion": "4.0",
                    "Severity": "CRITICAL",
                    "CVSS": {"nvd": {"V2Score": 10.0, "V3Score": 9.8}}
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns[0].cvss_score, Some(9.8));
    }

    #[test]
    fn trivy_v2_only_source_is_used() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2015-1234",
                    "PkgName": "legacy",
                    "InstalledVersion": "0.1",
                    "Severity": "HIGH",
                    "CVSS": {"nvd": {"V2Score": 7.8}}
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns[0].cvss_score, Some(7.8));
    }

    #[test]
    fn trivy_legacy_array_shape_is_normalized() {
        // 구버전 trivy는 Results 래퍼 없이 최상위 배열로 출력
        let stdout = r#"[
            {
                "Target": "nginx:latest",
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2023-44487",
                    "PkgName": "nghttp2",
                    "InstalledVersion": "1.43.0",
                    "Severity": "HIGH"
                }]
            }
        ]"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].cve_id, "CVE-2023-44487");
        assert_eq!(vulns[0].severity, Severity::High);
    }

    #[test]
    fn trivy_legacy_empty_array_means_zero_vulnerabilities() {
        let vulns = normalize(&raw("trivy", "[]")).unwrap();
        assert!(vulns.is_empty());
    }

    #[test]
    fn trivy_null_results_means_zero_vulnerabilities() {
        // 취약점이 없으면 trivy는 Results를 null/생략으로 출력
        let vulns = normalize(&raw("trivy", r#"{"Results": null}"#)).unwrap();
        assert!(vulns.is_empty());
        let vulns = normalize(&raw("trivy", r#"{}"#)).unwrap();
        assert!(vulns.is_empty());
    }

    #[test]
    fn trivy_multiple_results_are_flattened() {
        let stdout = r#"{
            "Results": [
                {"Vulnerabilities": [
                    {"VulnerabilityID": "CVE-1", "PkgName": "a", "InstalledVersion": "1", "Severity": "LOW"}
                ]},
                {"Vulnerabilities": null},
                {"Vulnerabilities": [
                    {"VulnerabilityID": "CVE-2", "PkgName": "b", "InstalledVersion": "2", "Severity": "HIGH"},
                    {"VulnerabilityID": "CVE-3", "PkgName": "c", "InstalledVersion": "3", "Severity": "negligible"}
                ]}
            ]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert_eq!(vulns.len(), 3);
        // negligible은 LOW로 매핑
        assert_eq!(vulns[2].severity, Severity::Low);
    }

    #[test]
    fn trivy_empty_fixed_version_is_none() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0005",
                    "PkgName": "nofix",
                    "InstalledVersion": "1.0",
                    "FixedVersion": "",
                    "Severity": "MEDIUM"
                }]
            }]
        }"#;
        let vulns = normalize(&raw("trivy", stdout)).unwrap();
        assert!(vulns[0].fixed_version.is_none());
    }

    #[test]
    fn trivy_malformed_json_is_error_not_empty_success() {
        let err = normalize(&raw("trivy", "this is not json")).unwrap_err();
        assert!(matches!(err, ScanError::MalformedOutput(_)));
    }

    #[test]
    fn empty_output_is_error() {
        let err = normalize(&raw("trivy", "   ")).unwrap_err();
        assert!(matches!(err, ScanError::MalformedOutput(_)));
    }

    #[test]
    fn clair_basic_report() {
        let stdout = r#"{
            "Vulnerabilities": [{
                "Name": "CVE-2023-38545",
                "Severity": "Critical",
                "PackageName": "curl",
                "PackageVersion": "8.3.0",
                "FixedInVersion": "8.4.0",
                "Description": "SOCKS5 heap buffer overflow",
                "Link": "https://curl.se/docs/CVE-2023-38545.html"
            }]
        }"#;
        let vulns = normalize(&raw("clair", stdout)).unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].cve_id, "CVE-2023-38545");
        assert_eq!(vulns[0].severity, Severity::Critical);
        assert_eq!(vulns[0].fixed_version.as_deref(), Some("8.4.0"));
        assert!(vulns[0].cvss_score.is_none());
        assert_eq!(vulns[0].references.len(), 1);
    }

    #[test]
    fn clair_severity_aliases() {
        let stdout = r#"{
            "Vulnerabilities": [
                {"Name": "CVE-1", "Severity": "Negligible", "PackageName": "a", "PackageVersion": "1"},
                {"Name": "CVE-2", "Severity": "Defcon1", "PackageName": "b", "PackageVersion": "2"},
                {"Name": "CVE-3", "Severity": "Unknown", "PackageName": "c", "PackageVersion": "3"}
            ]
        }"#;
        let vulns = normalize(&raw("clair", stdout)).unwrap();
        assert_eq!(vulns[0].severity, Severity::Low);
        assert_eq!(vulns[1].severity, Severity::Critical);
        assert_eq!(vulns[2].severity, Severity::Unknown);
    }

    #[test]
    fn clair_empty_vulnerabilities_list() {
        let vulns = normalize(&raw("clair", r#"{"Vulnerabilities": []}"#)).unwrap();
        assert!(vulns.is_empty());
    }

    #[test]
    fn clair_malformed_json_is_error() {
        let err = normalize(&raw("clair", "{broken")).unwrap_err();
        assert!(matches!(err, ScanError::MalformedOutput(_)));
    }

    #[test]
    fn unknown_backend_is_error() {
        let err = normalize(&raw("grype", "{}")).unwrap_err();
        assert!(matches!(err, ScanError::MalformedOutput(_)));
    }

    #[test]
    fn normalize_is_deterministic() {
        let stdout = r#"{
            "Results": [{
                "Vulnerabilities": [{
                    "VulnerabilityID": "CVE-2024-0006",
                    "PkgName": "det",
                    "InstalledVersion": "1.0",
                    "Severity": "HIGH"
                }]
            }]
        }"#;
        let output = raw("trivy", stdout);
        let first = normalize(&output).unwrap();
        let second = normalize(&output).unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].cve_id, second[0].cve_id);
        assert_eq!(first[0].severity, second[0].severity);
    }
}
