//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 스캔 요청부터 게이트 판정까지의 전 과정에서 공유되는 데이터 구조를 정의합니다.
//! 각 모듈은 이 타입들을 사용하여 스캔 결과와 판정 데이터를 교환합니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 취약점 심각도 레벨
///
/// 스캐너 백엔드가 보고한 심각도를 통합 표현합니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Unknown < Low < Medium < High < Critical`).
///
/// 매핑되지 않는 백엔드 고유 라벨은 [`Severity::Unknown`]으로 정규화되며,
/// 절대 버려지지 않습니다. `Unknown`은 별도 버킷으로 집계되지만
/// 게이트 임계값 판정에는 참여하지 않습니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 매핑되지 않은 심각도 — 집계는 되지만 게이트 판정에서 제외
    #[default]
    Unknown,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. 매핑되지 않는 라벨은 `None`을 반환하며,
    /// 호출자(정규화기)가 `Unknown`으로 처리합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "low" | "negligible" => Some(Self::Low),
            "medium" | "moderate" | "med" => Some(Self::Medium),
            "high" | "important" => Some(Self::High),
            "critical" | "crit" | "defcon1" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 취약점 정보
///
/// 스캐너 백엔드 출력에서 정규화된 단일 CVE 발견 항목입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    /// CVE ID (예: CVE-2024-1234)
    pub cve_id: String,
    /// 심각도
    pub severity: Severity,
    /// 영향받는 패키지명
    pub package_name: String,
    /// 설치된 패키지 버전
    pub package_version: String,
    /// 수정된 버전 (있을 경우)
    pub fixed_version: Option<String>,
    /// 취약점 설명
    pub description: String,
    /// CVSS 점수 — 스캐너가 보고하지 않으면 `None` (0.0과 구분됨)
    pub cvss_score: Option<f64>,
    /// 참고 링크
    #[serde(default)]
    pub references: Vec<String>,
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} {} (fixed: {})",
            self.cve_id,
            self.severity,
            self.package_name,
            self.package_version,
            self.fixed_version.as_deref().unwrap_or("N/A"),
        )
    }
}

/// 심각도별 취약점 수
///
/// `unknown`은 다섯 번째 버킷으로 항상 별도 집계됩니다.
/// [`SeverityCounts::total`]은 unknown을 포함하고,
/// [`SeverityCounts::gated_total`]은 게이트 판정 대상 버킷만 합산합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// 치명적 취약점 수
    pub critical: u64,
    /// 높은 심각도 수
    pub high: u64,
    /// 중간 심각도 수
    pub medium: u64,
    /// 낮은 심각도 수
    pub low: u64,
    /// 매핑되지 않은 심각도 수
    pub unknown: u64,
}

impl SeverityCounts {
    /// 해당 심각도의 버킷을 1 증가시킵니다.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }

    /// 심각도 버킷 값을 조회합니다.
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Unknown => self.unknown,
        }
    }

    /// unknown을 포함한 전체 취약점 수
    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low + self.unknown
    }

    /// 게이트 판정 대상 버킷(critical..low)의 합
    pub fn gated_total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "critical={} high={} medium={} low={} unknown={}",
            self.critical, self.high, self.medium, self.low, self.unknown,
        )
    }
}

/// 스캔 생명주기 상태
///
/// 상태 전환은 단방향입니다:
/// `Pending -> Running -> {Success, Failed, Timeout}`
/// 종료 상태에 도달한 스캔은 다시 전환되지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// 요청 접수됨, 아직 시작 전
    Pending,
    /// 스캐너 실행 중
    Running,
    /// 정상 완료 (취약점 0건 포함)
    Success,
    /// 스캐너 실행 또는 출력 파싱 실패
    Failed,
    /// 제한 시간 초과로 중단됨
    Timeout,
}

impl ScanStatus {
    /// 종료 상태 여부를 반환합니다.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }

    /// 해당 상태로의 전환 허용 여부를 반환합니다.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Timeout)
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// 스캔 요청
///
/// 대상 이미지 식별 정보를 담는 불변 타입입니다.
/// 태그를 지정하지 않으면 `latest`가 사용됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// 이미지명 (예: nginx, registry.example.com/app)
    pub image_name: String,
    /// 이미지 태그
    pub image_tag: String,
    /// 요청 접수 시각
    pub requested_at: SystemTime,
}

impl ScanRequest {
    /// 새 스캔 요청을 생성합니다. 태그 미지정 시 `latest`를 사용합니다.
    pub fn new(image_name: impl Into<String>, image_tag: Option<String>) -> Self {
        Self {
            image_name: image_name.into(),
            image_tag: image_tag.unwrap_or_else(|| "latest".to_owned()),
            requested_at: SystemTime::now(),
        }
    }

    /// `image:tag` 형식의 전체 참조 문자열을 반환합니다.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}

impl fmt::Display for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image_name, self.image_tag)
    }
}

/// 스캔 결과
///
/// 하나의 스캔 시도 전체를 기록합니다. 심각도 집계는 저장 필드가 아니라
/// [`ScanResult::severity_counts`]로 매번 계산되므로 취약점 목록과
/// 집계가 어긋날 수 없습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// 스캔 고유 ID (UUID v4)
    pub id: String,
    /// 이미지명
    pub image_name: String,
    /// 이미지 태그
    pub image_tag: String,
    /// 현재 상태
    pub status: ScanStatus,
    /// 사용된 스캐너 백엔드 (trivy, clair)
    pub scanner_backend: String,
    /// 스캐너 버전
    pub scanner_version: String,
    /// 스캔 시작 시각
    pub started_at: SystemTime,
    /// 종료 시각 (종료 상태 도달 시)
    pub completed_at: Option<SystemTime>,
    /// 소요 시간 (초)
    pub duration_secs: Option<f64>,
    /// 정규화된 취약점 목록
    pub vulnerabilities: Vec<Vulnerability>,
    /// 실패/타임아웃 시 에러 메시지
    pub error: Option<String>,
}

impl ScanResult {
    /// `Pending` 상태의 새 스캔 결과를 생성합니다.
    pub fn new(
        request: &ScanRequest,
        scanner_backend: impl Into<String>,
        scanner_version: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image_name: request.image_name.clone(),
            image_tag: request.image_tag.clone(),
            status: ScanStatus::Pending,
            scanner_backend: scanner_backend.into(),
            scanner_version: scanner_version.into(),
            started_at: SystemTime::now(),
            completed_at: None,
            duration_secs: None,
            vulnerabilities: Vec::new(),
            error: None,
        }
    }

    /// 취약점 목록에서 심각도별 집계를 계산합니다.
    pub fn severity_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for vuln in &self.vulnerabilities {
            counts.record(vuln.severity);
        }
        counts
    }

    /// `image:tag` 형식의 전체 참조 문자열을 반환합니다.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scan[{}] {}:{} status={} vulns={}",
            &self.id[..8.min(self.id.len())],
            self.image_name,
            self.image_tag,
            self.status,
            self.vulnerabilities.len(),
        )
    }
}

/// 취약점 예외
///
/// 승인된 CVE 예외를 나타냅니다. `image_name`이 `None`이면 전역 예외로
/// 모든 이미지에 적용됩니다. 시각 `T`에 유효한 조건:
/// `is_active && (expires_at.is_none() || expires_at > T)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exception {
    /// 예외 고유 ID (UUID v4)
    pub id: String,
    /// 대상 CVE ID — 대소문자 무관 매칭
    pub cve_id: String,
    /// 대상 이미지명 — `None`이면 전역 적용
    pub image_name: Option<String>,
    /// 예외 사유
    pub reason: String,
    /// 승인자
    pub approved_by: String,
    /// 승인 시각
    pub approved_at: SystemTime,
    /// 만료 시각 — `None`이면 무기한
    pub expires_at: Option<SystemTime>,
    /// 활성화 여부 — 해제(revoke) 시 false
    pub is_active: bool,
    /// 생성 시각
    pub created_at: SystemTime,
}

impl Exception {
    /// 시각 `at` 기준 유효 여부를 반환합니다.
    pub fn is_valid_at(&self, at: SystemTime) -> bool {
        self.is_active && self.expires_at.is_none_or(|expiry| expiry > at)
    }

    /// 해당 CVE에 적용되는지 확인합니다 (대소문자 무관).
    pub fn matches_cve(&self, cve_id: &str) -> bool {
        self.cve_id.eq_ignore_ascii_case(cve_id)
    }

    /// 해당 이미지에 적용되는지 확인합니다.
    ///
    /// `image_name`이 `None`이면 전역 예외로 항상 적용되고,
    /// `Some`이면 정확히 일치해야 합니다.
    pub fn matches_image(&self, image_name: &str) -> bool {
        match &self.image_name {
            Some(scoped) => scoped == image_name,
            None => true,
        }
    }

    /// 이미지 한정 예외 여부 — 충돌 해소 시 전역 예외보다 우선합니다.
    pub fn is_image_scoped(&self) -> bool {
        self.image_name.is_some()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scope={} active={} approved_by={}",
            self.cve_id,
            self.image_name.as_deref().unwrap_or("*"),
            self.is_active,
            self.approved_by,
        )
    }
}

/// 게이트 임계값
///
/// 해당 등급 이상의 취약점이 하나라도 존재하면 빌드가 실패합니다.
/// 순서: `Low < Medium < High < Critical` (Low가 가장 엄격).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateThreshold {
    /// LOW 이상에서 실패 (가장 엄격)
    Low,
    /// MEDIUM 이상에서 실패
    Medium,
    /// HIGH 이상에서 실패
    High,
    /// CRITICAL에서만 실패 (가장 관대)
    Critical,
}

impl GateThreshold {
    /// 문자열에서 임계값을 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 임계값이 가리키는 최소 심각도를 반환합니다.
    pub fn min_severity(self) -> Severity {
        match self {
            Self::Low => Severity::Low,
            Self::Medium => Severity::Medium,
            Self::High => Severity::High,
            Self::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for GateThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 게이트 판정 결과
///
/// 예외 적용 후의 집계와 판정을 담는 파생 데이터입니다.
/// 저장된 스캔에 대해 현재 예외 집합으로 언제든 재계산할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    /// 판정 대상 스캔 ID
    pub scan_id: String,
    /// 빌드 실패 여부
    pub should_fail_build: bool,
    /// 적용된 임계값
    pub threshold: GateThreshold,
    /// 예외 적용 후 집계
    pub effective_counts: SeverityCounts,
    /// 예외로 제외된 취약점 수
    pub excepted_count: u64,
    /// 판정 시각
    pub evaluated_at: SystemTime,
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.should_fail_build {
            "FAIL"
        } else {
            "PASS"
        };
        write!(
            f,
            "{} threshold={} effective=[{}] excepted={}",
            verdict, self.threshold, self.effective_counts, self.excepted_count,
        )
    }
}
