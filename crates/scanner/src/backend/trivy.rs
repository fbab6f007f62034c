//! trivy 백엔드
//!
//! `trivy image --format json --quiet <image:tag>` 서브프로세스를 실행합니다.
//! trivy는 취약점이 발견되어도 기본적으로 종료 코드 0을 반환하므로
//! 0이 아닌 종료 코드는 실행 실패로 처리합니다.

use std::time::Duration;

use imagegate_core::error::ScanError;

use crate::backend::{RawScanOutput, ScannerBackend, VERSION_PROBE_TIMEOUT, run_scanner_process};

/// trivy 백엔드
#[derive(Debug, Clone)]
pub struct TrivyBackend {
    binary: String,
}

impl TrivyBackend {
    /// trivy 바이너리 경로로 백엔드를 생성합니다.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ScannerBackend for TrivyBackend {
    fn kind(&self) -> &'static str {
        "trivy"
    }

    async fn version(&self) -> Result<String, ScanError> {
        let output = run_scanner_process(
            self.kind(),
            &self.binary,
            &["--version"],
            VERSION_PROBE_TIMEOUT,
        )
        .await?;
        // 첫 줄 형식: "Version: 0.50.0"
        let first_line = output.stdout.lines().next().unwrap_or_default();
        let version = first_line
            .strip_prefix("Version:")
            .map(str::trim)
            .unwrap_or(first_line.trim());
        if version.is_empty() {
            return Err(ScanError::ExecutionFailed(
                "trivy --version produced no output".to_owned(),
            ));
        }
        Ok(version.to_owned())
    }

    async fn is_available(&self) -> bool {
        self.version().await.is_ok()
    }

    async fn scan(&self, image_ref: &str, timeout: Duration) -> Result<RawScanOutput, ScanError> {
        run_scanner_process(
            self.kind(),
            &self.binary,
            &["image", "--format", "json", "--quiet", image_ref],
            timeout,
        )
        .await
    }
}
