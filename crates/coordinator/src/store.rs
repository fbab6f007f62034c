//! 스캔 저장소 — 완료·진행 중 스캔의 이력과 통계
//!
//! [`ScanStore`]는 스캔 결과를 접수 순서대로 메모리에 유지합니다.
//! 상태 갱신 시 [`ScanStatus::can_transition_to`]를 강제하여
//! 종료 상태에 도달한 스캔이 다시 바뀌는 일을 막습니다.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use imagegate_core::error::{ImagegateError, ScanError};
use imagegate_core::types::{ScanResult, ScanStatus, SeverityCounts};

/// 기간별 스캔 통계
///
/// [`ScanStore::statistics`]가 계산하는 파생 데이터입니다.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatistics {
    /// 집계 기간 (일)
    pub period_days: u64,
    /// 기간 내 전체 스캔 수
    pub total_scans: u64,
    /// 성공한 스캔 수
    pub success: u64,
    /// 실패한 스캔 수
    pub failed: u64,
    /// 타임아웃된 스캔 수
    pub timeout: u64,
    /// 아직 종료 상태에 도달하지 않은 스캔 수
    pub in_progress: u64,
    /// 심각도별 발견 취약점 합계
    pub severity_totals: SeverityCounts,
    /// 성공한 스캔의 평균 소요 시간 (초)
    pub avg_duration_secs: Option<f64>,
    /// 스캔된 고유 이미지 수 (태그 구분)
    pub unique_images: u64,
}

/// 인메모리 스캔 저장소
///
/// 내부 Vec은 접수 순서를 보존하므로 이력 조회는 역순으로
/// 최신 스캔부터 반환합니다.
#[derive(Debug, Default)]
pub struct ScanStore {
    scans: RwLock<Vec<ScanResult>>,
}

impl ScanStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 스캔 기록을 추가합니다.
    pub async fn insert(&self, scan: ScanResult) {
        self.scans.write().await.push(scan);
    }

    /// 스캔 기록을 갱신합니다.
    ///
    /// 상태가 바뀌는 갱신은 허용된 전환이어야 합니다. 종료 상태에
    /// 도달한 스캔을 되돌리려는 시도는 [`ScanError::InvalidTransition`]으로
    /// 거부됩니다.
    pub async fn update(&self, updated: ScanResult) -> Result<(), ImagegateError> {
        let mut scans = self.scans.write().await;
        let existing = scans
            .iter_mut()
            .find(|s| s.id == updated.id)
            .ok_or_else(|| ScanError::NotFound {
                scan_id: updated.id.clone(),
            })?;

        if existing.status != updated.status
            && !existing.status.can_transition_to(updated.status)
        {
            warn!(
                scan_id = updated.id.as_str(),
                from = %existing.status,
                to = %updated.status,
                "rejected scan status transition"
            );
            return Err(ScanError::InvalidTransition {
                from: existing.status.to_string(),
                to: updated.status.to_string(),
            }
            .into());
        }

        *existing = updated;
        Ok(())
    }

    /// ID로 스캔을 조회합니다.
    pub async fn get(&self, scan_id: &str) -> Option<ScanResult> {
        self.scans
            .read()
            .await
            .iter()
            .find(|s| s.id == scan_id)
            .cloned()
    }

    /// 저장된 스캔 수를 반환합니다.
    pub async fn len(&self) -> usize {
        self.scans.read().await.len()
    }

    /// 저장소가 비어 있는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.scans.read().await.is_empty()
    }

    /// 스캔 이력을 최신순으로 반환합니다.
    ///
    /// `image_name`이 주어지면 해당 이미지의 스캔만 반환하고,
    /// `limit`이 0이면 빈 목록을 반환합니다.
    pub async fn history(&self, image_name: Option<&str>, limit: usize) -> Vec<ScanResult> {
        self.scans
            .read()
            .await
            .iter()
            .rev()
            .filter(|s| image_name.is_none_or(|name| s.image_name == name))
            .take(limit)
            .cloned()
            .collect()
    }

    /// 최근 `days`일 동안의 스캔 통계를 계산합니다.
    ///
    /// 기준 시각 `now`를 인자로 받아 테스트에서 재현 가능합니다.
    pub async fn statistics(&self, days: u64, now: SystemTime) -> ScanStatistics {
        let cutoff = now.checked_sub(Duration::from_secs(days.saturating_mul(86_400)));
        let scans = self.scans.read().await;

        let mut stats = ScanStatistics {
            period_days: days,
            total_scans: 0,
            success: 0,
            failed: 0,
            timeout: 0,
            in_progress: 0,
            severity_totals: SeverityCounts::default(),
            avg_duration_secs: None,
            unique_images: 0,
        };

        let mut images = std::collections::HashSet::new();
        let mut duration_sum = 0.0_f64;
        let mut duration_count = 0_u64;

        for scan in scans.iter() {
            if let Some(cutoff) = cutoff
                && scan.started_at < cutoff
            {
                continue;
            }

            stats.total_scans += 1;
            images.insert(scan.image_ref());
            match scan.status {
                ScanStatus::Success => {
                    stats.success += 1;
                    let counts = scan.severity_counts();
                    stats.severity_totals.critical += counts.critical;
                    stats.severity_totals.high += counts.high;
                    stats.severity_totals.medium += counts.medium;
                    stats.severity_totals.low += counts.low;
                    stats.severity_totals.unknown += counts.unknown;
                    if let Some(duration) = scan.duration_secs {
                        duration_sum += duration;
                        duration_count += 1;
                    }
                }
                ScanStatus::Failed => stats.failed += 1,
                ScanStatus::Timeout => stats.timeout += 1,
                ScanStatus::Pending | ScanStatus::Running => stats.in_progress += 1,
            }
        }

        stats.unique_images = images.len() as u64;
        if duration_count > 0 {
            stats.avg_duration_secs = Some(duration_sum / duration_count as f64);
        }
        stats
    }
}
