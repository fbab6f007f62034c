//! 파이프라인 trait — 모듈 생명주기 정의
//!
//! 데몬이 관리하는 장기 실행 모듈은 [`Pipeline`]을 구현합니다.
//! `start`/`stop`으로 생명주기를 제어하고 `health_check`로 상태를
//! 보고합니다.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::error::ImagegateError;

/// 파이프라인 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 동작 중이지만 일부 기능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부를 반환합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부를 반환합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 장기 실행 모듈의 생명주기 trait
///
/// 구현체는 `start` 호출 후 내부 태스크를 구동하고, `stop` 호출 시
/// 진행 중인 작업을 정리해야 합니다. 이미 실행 중인 파이프라인의
/// `start`는 [`PipelineError::AlreadyRunning`](crate::error::PipelineError::AlreadyRunning)을
/// 반환해야 합니다.
pub trait Pipeline: Send {
    /// 파이프라인을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), ImagegateError>> + Send;

    /// 파이프라인을 중지하고 리소스를 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), ImagegateError>> + Send;

    /// 현재 건강 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
