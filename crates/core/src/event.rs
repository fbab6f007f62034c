//! 이벤트 시스템 — 모듈 간 통신의 기본 단위
//!
//! 스캔 완료와 게이트 판정은 이벤트로 발행되어 데몬의 감사 로그 태스크가
//! 소비합니다. [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는
//! 메타데이터이며, [`Event`] trait은 모든 이벤트 타입이 구현해야 하는
//! 인터페이스입니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{GateDecision, ScanStatus, SeverityCounts};

// --- 모듈명 상수 ---

/// 스캔 코디네이터 모듈명
pub const MODULE_COORDINATOR: &str = "scan-coordinator";
/// 스캐너 어댑터 모듈명
pub const MODULE_SCANNER: &str = "scanner-adapter";
/// 게이트 엔진 모듈명
pub const MODULE_GATE: &str = "gate-engine";

// --- 이벤트 타입 상수 ---

/// 스캔 이벤트 타입
pub const EVENT_TYPE_SCAN: &str = "scan";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
///
/// 각 이벤트의 발생 시각, 생성 모듈, 분산 추적 ID를 담고 있어
/// 이벤트 흐름을 추적하고 디버깅할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "scan-coordinator")
    pub source_module: String,
    /// 분산 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    ///
    /// 이벤트 체인에서 동일한 추적 ID를 유지할 때 사용합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    ///
    /// 새로운 이벤트 체인의 시작점에서 사용합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 스캔이 종료 상태에 도달했을 때 발행되는 이벤트
///
/// 성공 시에는 집계와 게이트 판정을, 실패/타임아웃 시에는
/// 에러 메시지를 함께 담습니다.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 스캔 ID
    pub scan_id: String,
    /// 대상 이미지 참조 (`image:tag`)
    pub image_ref: String,
    /// 최종 스캔 상태
    pub status: ScanStatus,
    /// 심각도별 집계 (예외 적용 전)
    pub counts: SeverityCounts,
    /// 게이트 판정 (성공한 스캔에만 존재)
    pub decision: Option<GateDecision>,
    /// 실패/타임아웃 시 에러 메시지
    pub error: Option<String>,
}

impl ScanEvent {
    /// 새로운 trace를 시작하는 스캔 이벤트를 생성합니다.
    pub fn new(
        scan_id: impl Into<String>,
        image_ref: impl Into<String>,
        status: ScanStatus,
        counts: SeverityCounts,
        decision: Option<GateDecision>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_COORDINATOR),
            scan_id: scan_id.into(),
            image_ref: image_ref.into(),
            status,
            counts,
            decision,
            error,
        }
    }

    /// 기존 trace에 연결된 스캔 이벤트를 생성합니다.
    pub fn with_trace(
        scan_id: impl Into<String>,
        image_ref: impl Into<String>,
        status: ScanStatus,
        counts: SeverityCounts,
        decision: Option<GateDecision>,
        error: Option<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_COORDINATOR, trace_id),
            scan_id: scan_id.into(),
            image_ref: image_ref.into(),
            status,
            counts,
            decision,
            error,
        }
    }
}

impl Event for ScanEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_SCAN
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScanEvent[{}] {} status={} [{}]",
            &self.id[..8.min(self.id.len())],
            self.image_ref,
            self.status,
            self.counts,
        )
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            format!("{secs}")
        }
        Err(_) => "unknown".to_owned(),
    }
}
