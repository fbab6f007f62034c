//! clair 백엔드
//!
//! `clairctl report --out json <image:tag>` 서브프로세스를 실행합니다.
//! clairctl은 Clair 서버에 이미지 인덱싱을 요청하고 취약점 리포트를
//! 받아오므로, 서버 연결 실패도 종료 코드로 드러납니다.

use std::time::Duration;

use imagegate_core::error::ScanError;

use crate::backend::{RawScanOutput, ScannerBackend, VERSION_PROBE_TIMEOUT, run_scanner_process};

/// clair 백엔드 (clairctl 경유)
#[derive(Debug, Clone)]
pub struct ClairBackend {
    binary: String,
}

impl ClairBackend {
    /// clairctl 바이너리 경로로 백엔드를 생성합니다.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ScannerBackend for ClairBackend {
    fn kind(&self) -> &'static str {
        "clair"
    }

    async fn version(&self) -> Result<String, ScanError> {
        let output = run_scanner_process(
            self.kind(),
            &self.binary,
            &["--version"],
            VERSION_PROBE_TIMEOUT,
        )
        .await?;
        // 출력 형식: "clairctl version v4.7.2"
        let first_line = output.stdout.lines().next().unwrap_or_default();
        let version = first_line
            .rsplit(' ')
            .next()
            .unwrap_or(first_line)
            .trim();
        if version.is_empty() {
            return Err(ScanError::ExecutionFailed(
                "clairctl --version produced no output".to_owned(),
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
            &["report", "--out", "json", image_ref],
            timeout,
        )
        .await
    }
}
