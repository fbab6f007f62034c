//! 예외 해소 — 승인된 예외를 취약점 목록에 적용
//!
//! [`resolve`]는 순수 함수입니다. 판정 시각 `at`을 인자로 받으므로
//! 동일한 입력에 대해 항상 동일한 결과를 반환하며, 저장된 스캔에 대해
//! 언제든 재실행할 수 있습니다.
//!
//! # 매칭 규칙
//!
//! - CVE ID는 대소문자를 구분하지 않고 비교합니다.
//! - 이미지 한정 예외는 이미지명이 정확히 일치해야 하고,
//!   전역 예외(`image_name = None`)는 모든 이미지에 적용됩니다.
//! - 유효 조건: `is_active && (expires_at == None || expires_at > at)`
//!
//! # 충돌 해소
//!
//! 하나의 취약점에 여러 유효 예외가 매칭되면:
//! 1. 이미지 한정 예외가 전역 예외보다 우선
//! 2. 같은 범위에서는 `approved_at`이 최신인 예외가 우선

use std::time::SystemTime;

use tracing::debug;

use imagegate_core::types::{Exception, Vulnerability};

/// 예외로 제외된 취약점과 적용된 예외의 기록
#[derive(Debug, Clone)]
pub struct ExceptedVulnerability {
    /// 제외된 취약점
    pub vulnerability: Vulnerability,
    /// 적용된 예외 ID
    pub exception_id: String,
}

/// 예외 적용 결과
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// 예외 적용 후 남은 취약점
    pub retained: Vec<Vulnerability>,
    /// 예외로 제외된 취약점
    pub excepted: Vec<ExceptedVulnerability>,
}

impl Resolution {
    /// 제외된 취약점 수
    pub fn excepted_count(&self) -> u64 {
        self.excepted.len() as u64
    }
}

/// 취약점 목록에 예외를 적용합니다.
///
/// 입력을 변형하지 않고 새 목록을 반환합니다. 취약점 순서는 보존됩니다.
pub fn resolve(
    vulnerabilities: &[Vulnerability],
    image_name: &str,
    exceptions: &[Exception],
    at: SystemTime,
) -> Resolution {
    let mut resolution = Resolution::default();

    for vuln in vulnerabilities {
        match best_match(&vuln.cve_id, image_name, exceptions, at) {
            Some(exception) => {
                debug!(
                    cve_id = vuln.cve_id.as_str(),
                    exception_id = exception.id.as_str(),
                    "vulnerability excluded by exception"
                );
                resolution.excepted.push(ExceptedVulnerability {
                    vulnerability: vuln.clone(),
                    exception_id: exception.id.clone(),
                });
            }
            None => resolution.retained.push(vuln.clone()),
        }
    }

    resolution
}

/// 해당 취약점에 적용할 예외를 선택합니다.
///
/// 이미지 한정 > 전역, 같은 범위에서는 최신 `approved_at` 우선.
fn best_match<'a>(
    cve_id: &str,
    image_name: &str,
    exceptions: &'a [Exception],
    at: SystemTime,
) -> Option<&'a Exception> {
    exceptions
        .iter()
        .filter(|e| e.is_valid_at(at) && e.matches_cve(cve_id) && e.matches_image(image_name))
        .max_by_key(|e| (e.is_image_scoped(), e.approved_at))
}
