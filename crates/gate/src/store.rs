//! 예외 저장소 — JSON 파일 기반 예외 CRUD와 영속화
//!
//! [`ExceptionStore`]는 승인된 예외 목록을 메모리에 유지하고
//! 변경 시마다 JSON 파일에 기록합니다. 읽기는 스냅샷으로 제공되어
//! 게이트 판정의 순수 함수들([`resolve`](crate::resolver::resolve),
//! [`evaluate`](crate::decision::evaluate))에 그대로 전달됩니다.

use std::path::PathBuf;
use std::time::SystemTime;

use metrics::gauge;
use tokio::sync::RwLock;
use tracing::{info, warn};

use imagegate_core::error::{GateError, ImagegateError};
use imagegate_core::metrics::GATE_EXCEPTIONS_ACTIVE;
use imagegate_core::types::Exception;

/// 새 예외 생성 요청
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewException {
    /// 대상 CVE ID
    pub cve_id: String,
    /// 대상 이미지명 — `None`이면 전역 적용
    pub image_name: Option<String>,
    /// 예외 사유
    pub reason: String,
    /// 승인자
    pub approved_by: String,
    /// 만료 시각 — `None`이면 무기한
    pub expires_at: Option<SystemTime>,
}

/// JSON 파일 기반 예외 저장소
#[derive(Debug)]
pub struct ExceptionStore {
    path: PathBuf,
    exceptions: RwLock<Vec<Exception>>,
}

impl ExceptionStore {
    /// 파일에서 예외 목록을 로드합니다.
    ///
    /// 파일이 없으면 빈 저장소로 시작합니다. 파일이 있지만 파싱할 수
    /// 없으면 에러입니다 — 손상된 예외 파일을 조용히 비우면 차단됐어야
    /// 할 취약점이 통과할 수 있습니다.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ImagegateError> {
        let path = path.into();
        let exceptions = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Vec<Exception>>(&content).map_err(|e| {
                GateError::Persist(format!(
                    "failed to parse exception file {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "exception file not found, starting empty");
                Vec::new()
            }
            Err(e) => return Err(ImagegateError::Io(e)),
        };

        info!(
            path = %path.display(),
            count = exceptions.len(),
            "exception store loaded"
        );
        let store = Self {
            path,
            exceptions: RwLock::new(exceptions),
        };
        store.update_active_gauge().await;
        Ok(store)
    }

    /// 현재 예외 목록 전체의 스냅샷을 반환합니다.
    pub async fn snapshot(&self) -> Vec<Exception> {
        self.exceptions.read().await.clone()
    }

    /// ID로 예외를 조회합니다.
    pub async fn get(&self, exception_id: &str) -> Option<Exception> {
        self.exceptions
            .read()
            .await
            .iter()
            .find(|e| e.id == exception_id)
            .cloned()
    }

    /// 시각 `at` 기준 유효한 예외 수를 반환합니다.
    pub async fn active_count(&self, at: SystemTime) -> usize {
        self.exceptions
            .read()
            .await
            .iter()
            .filter(|e| e.is_valid_at(at))
            .count()
    }

    /// 새 예외를 승인하고 파일에 기록합니다.
    pub async fn approve(&self, new: NewException) -> Result<Exception, ImagegateError> {
        validate_new(&new)?;

        let now = SystemTime::now();
        let exception = Exception {
            id: uuid::Uuid::new_v4().to_string(),
            cve_id: new.cve_id,
            image_name: new.image_name,
            reason: new.reason,
            approved_by: new.approved_by,
            approved_at: now,
            expires_at: new.expires_at,
            is_active: true,
            created_at: now,
        };

        {
            let mut exceptions = self.exceptions.write().await;
            exceptions.push(exception.clone());
        }
        self.persist().await?;
        self.update_active_gauge().await;

        info!(
            exception_id = exception.id.as_str(),
            cve_id = exception.cve_id.as_str(),
            scope = exception.image_name.as_deref().unwrap_or("*"),
            approved_by = exception.approved_by.as_str(),
            "exception approved"
        );
        Ok(exception)
    }

    /// 예외를 해제(비활성화)하고 파일에 기록합니다.
    ///
    /// 예외를 삭제하지 않고 `is_active = false`로 남겨 감사 이력을
    /// 보존합니다.
    pub async fn revoke(&self, exception_id: &str) -> Result<Exception, ImagegateError> {
        let revoked = {
            let mut exceptions = self.exceptions.write().await;
            let exception = exceptions
                .iter_mut()
                .find(|e| e.id == exception_id)
                .ok_or_else(|| GateError::ExceptionNotFound {
                    exception_id: exception_id.to_owned(),
                })?;
            exception.is_active = false;
            exception.clone()
        };
        self.persist().await?;
        self.update_active_gauge().await;

        info!(
            exception_id = revoked.id.as_str(),
            cve_id = revoked.cve_id.as_str(),
            "exception revoked"
        );
        Ok(revoked)
    }

    /// 현재 예외 목록을 JSON 파일에 기록합니다.
    pub async fn persist(&self) -> Result<(), ImagegateError> {
        let exceptions = self.exceptions.read().await;
        let content = serde_json::to_string_pretty(&*exceptions)
            .map_err(|e| GateError::Persist(format!("failed to serialize exceptions: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GateError::Persist(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            GateError::Persist(format!("failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    async fn update_active_gauge(&self) {
        let count = self.active_count(SystemTime::now()).await;
        gauge!(GATE_EXCEPTIONS_ACTIVE).set(count as f64);
    }
}

fn validate_new(new: &NewException) -> Result<(), GateError> {
    if new.cve_id.trim().is_empty() {
        return Err(GateError::InvalidException(
            "cve_id must not be empty".to_owned(),
        ));
    }
    if new.reason.trim().is_empty() {
        return Err(GateError::InvalidException(
            "reason must not be empty".to_owned(),
        ));
    }
    if new.approved_by.trim().is_empty() {
        return Err(GateError::InvalidException(
            "approved_by must not be empty".to_owned(),
        ));
    }
    if let Some(image) = &new.image_name
        && image.trim().is_empty()
    {
        warn!("exception with empty image_name treated as invalid, use null for global scope");
        return Err(GateError::InvalidException(
            "image_name must be null (global) or a non-empty image name".to_owned(),
        ));
    }
    Ok(())
}
