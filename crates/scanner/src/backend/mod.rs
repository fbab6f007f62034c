//! 스캐너 백엔드 — 외부 스캐너 프로세스 실행 경계
//!
//! [`ScannerBackend`] trait이 trivy/clair 백엔드의 공통 계약을 정의합니다.
//! 모든 백엔드는 외부 바이너리를 서브프로세스로 실행하며, 제한 시간을
//! 초과하면 프로세스를 강제 종료하고 [`ScanError::Timeout`]을 반환합니다.

use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use imagegate_core::error::ScanError;

pub mod clair;
pub mod trivy;

pub use clair::ClairBackend;
pub use trivy::TrivyBackend;

/// 스캐너 프로세스의 원시 출력
///
/// 정규화 전의 stdout/stderr를 그대로 담습니다. 실패 진단을 위해
/// stderr와 종료 코드를 보존합니다.
#[derive(Debug, Clone)]
pub struct RawScanOutput {
    /// 출력을 생성한 백엔드 (trivy, clair)
    pub backend: String,
    /// 표준 출력 (JSON)
    pub stdout: String,
    /// 표준 에러
    pub stderr: String,
    /// 프로세스 종료 코드 (시그널 종료 시 None)
    pub exit_code: Option<i32>,
    /// 실행 소요 시간
    pub elapsed: Duration,
}

/// 스캐너 백엔드 공통 계약
///
/// `scan`은 검증된 이미지 참조만 받는다고 가정합니다. 제한 시간 초과 시
/// 외부 프로세스는 종료되어야 하며 좀비 프로세스를 남기지 않아야 합니다.
pub trait ScannerBackend: Send + Sync {
    /// 백엔드 식별자 (trivy, clair)
    fn kind(&self) -> &'static str;

    /// 스캐너 바이너리의 버전 문자열을 조회합니다.
    fn version(&self) -> impl Future<Output = Result<String, ScanError>> + Send;

    /// 스캐너 바이너리 실행 가능 여부를 확인합니다.
    fn is_available(&self) -> impl Future<Output = bool> + Send;

    /// 이미지를 스캔하고 원시 출력을 반환합니다.
    fn scan(
        &self,
        image_ref: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawScanOutput, ScanError>> + Send;
}

/// 설정에 따라 선택되는 백엔드
///
/// trait object 대신 enum 디스패치를 사용하여 `ScannerBackend`의
/// RPITIT 메서드를 그대로 유지합니다.
#[derive(Debug, Clone)]
pub enum AnyBackend {
    /// trivy 백엔드
    Trivy(TrivyBackend),
    /// clair 백엔드 (clairctl)
    Clair(ClairBackend),
}

impl ScannerBackend for AnyBackend {
    fn kind(&self) -> &'static str {
        match self {
            Self::Trivy(backend) => backend.kind(),
            Self::Clair(backend) => backend.kind(),
        }
    }

    async fn version(&self) -> Result<String, ScanError> {
        match self {
            Self::Trivy(backend) => backend.version().await,
            Self::Clair(backend) => backend.version().await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            Self::Trivy(backend) => backend.is_available().await,
            Self::Clair(backend) => backend.is_available().await,
        }
    }

    async fn scan(&self, image_ref: &str, timeout: Duration) -> Result<RawScanOutput, ScanError> {
        match self {
            Self::Trivy(backend) => backend.scan(image_ref, timeout).await,
            Self::Clair(backend) => backend.scan(image_ref, timeout).await,
        }
    }
}

/// 외부 스캐너 프로세스를 실행하고 출력을 수집합니다.
///
/// 제한 시간이 지나면 자식 프로세스를 강제 종료합니다 (`kill_on_drop`).
pub(crate) async fn run_scanner_process(
    backend: &'static str,
    binary: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<RawScanOutput, ScanError> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(backend, binary, ?args, "spawning scanner process");

    let started = Instant::now();
    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScanError::Unavailable(format!("{binary}: command not found"))
        } else {
            ScanError::ExecutionFailed(format!("failed to spawn {binary}: {e}"))
        }
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ScanError::ExecutionFailed(format!(
                "failed to collect {binary} output: {e}"
            )));
        }
        // timeout 경과: wait_with_output future가 드롭되며 kill_on_drop이
        // 자식 프로세스에 SIGKILL을 보냅니다.
        Err(_) => {
            return Err(ScanError::Timeout {
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    let elapsed = started.elapsed();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code();

    if !output.status.success() {
        let detail = stderr.lines().next().unwrap_or("no stderr output");
        return Err(ScanError::ExecutionFailed(format!(
            "{binary} exited with {:?}: {detail}",
            exit_code
        )));
    }

    Ok(RawScanOutput {
        backend: backend.to_owned(),
        stdout,
        stderr,
        exit_code,
        elapsed,
    })
}

/// 버전 조회용 짧은 실행 제한 시간
pub(crate) const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
