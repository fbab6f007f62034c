//! 스캔 코디네이터 — 요청부터 게이트 판정까지의 전체 흐름 관리
//!
//! [`ScanCoordinator`]는 이미지 참조 검증, 동일 이미지 중복 스캔 차단,
//! 스캐너 실행, 출력 정규화, 게이트 판정, 이벤트 발행을 순서대로
//! 수행합니다. 스캔 상태 전환은 [`ScanStore`]가 강제하는 단방향
//! 상태 머신을 따릅니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use metrics::{counter, gauge, histogram};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{info, warn};

use imagegate_core::config::ImagegateConfig;
use imagegate_core::error::{ImagegateError, PipelineError, ScanError};
use imagegate_core::event::ScanEvent;
use imagegate_core::metrics::{
    GATE_DECISIONS_TOTAL, GATE_EXCEPTED_VULNERABILITIES_TOTAL, LABEL_BACKEND, LABEL_RESULT,
    LABEL_SEVERITY, LABEL_STATUS, SCANNER_SCAN_DURATION_SECONDS, SCANNER_SCANS_IN_FLIGHT,
    SCANNER_SCANS_TOTAL, SCANNER_VULNERABILITIES_FOUND_TOTAL,
};
use imagegate_core::pipeline::{HealthStatus, Pipeline};
use imagegate_core::types::{
    GateDecision, GateThreshold, ScanRequest, ScanResult, ScanStatus, Severity,
};
use imagegate_gate::evaluate;
use imagegate_gate::store::ExceptionStore;
use imagegate_scanner::normalize;
use imagegate_scanner::{ScannerBackend, validate_image_ref};

use crate::store::ScanStore;

/// 이벤트 채널 기본 용량
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// 코디네이터 내부 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoordinatorState {
    /// 생성됨, 아직 시작 전
    Initialized,
    /// 실행 중
    Running,
    /// 중지됨
    Stopped,
}

impl CoordinatorState {
    fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// 스캔 한 건의 최종 결과와 게이트 판정
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// 종료 상태에 도달한 스캔 결과
    pub scan: ScanResult,
    /// 게이트 판정 — 실패/타임아웃 스캔은 항상 빌드 실패
    pub decision: GateDecision,
}

/// 스캔 생명주기 코디네이터
///
/// [`ScanCoordinatorBuilder`]로 생성합니다. 데몬과 API 핸들러가
/// `Arc`로 공유하므로 스캔 경로의 메서드는 모두 `&self`를 받습니다.
#[derive(Debug)]
pub struct ScanCoordinator<B: ScannerBackend> {
    backend: B,
    scan_timeout: Duration,
    threshold: GateThreshold,
    store: Arc<ScanStore>,
    exceptions: Arc<ExceptionStore>,
    event_tx: mpsc::Sender<ScanEvent>,
    in_flight: Mutex<HashSet<String>>,
    state: RwLock<CoordinatorState>,
    scans_completed: Arc<AtomicU64>,
    scans_failed: Arc<AtomicU64>,
}

impl<B: ScannerBackend> ScanCoordinator<B> {
    /// 스캔을 실행하고 최종 결과와 게이트 판정을 반환합니다.
    ///
    /// 동일 `image:tag`에 대한 스캔이 진행 중이면
    /// [`ScanError::InFlight`]로 즉시 거부합니다. 스캔이 어떤 이유로
    /// 끝나든 진행 중 표시는 반드시 해제됩니다.
    pub async fn submit(&self, request: ScanRequest) -> Result<ScanOutcome, ImagegateError> {
        validate_image_ref(&request)?;
        let image_ref = request.image_ref();

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(image_ref.clone()) {
                return Err(ScanError::InFlight { image_ref }.into());
            }
        }
        gauge!(SCANNER_SCANS_IN_FLIGHT).increment(1.0);

        let outcome = self.run_scan(&request, &image_ref).await;

        self.in_flight.lock().await.remove(&image_ref);
        gauge!(SCANNER_SCANS_IN_FLIGHT).decrement(1.0);
        outcome
    }

    async fn run_scan(
        &self,
        request: &ScanRequest,
        image_ref: &str,
    ) -> Result<ScanOutcome, ImagegateError> {
        let version = self.backend.version().await?;
        let mut scan = ScanResult::new(request, self.backend.kind(), version);
        self.store.insert(scan.clone()).await;

        scan.status = ScanStatus::Running;
        self.store.update(scan.clone()).await?;
        info!(
            scan_id = scan.id.as_str(),
            image = image_ref,
            backend = self.backend.kind(),
            timeout_secs = self.scan_timeout.as_secs(),
            "scan started"
        );

        let started = Instant::now();
        let (status, vulnerabilities, error) =
            match self.backend.scan(image_ref, self.scan_timeout).await {
                Ok(raw) => match normalize(&raw) {
                    Ok(vulns) => (ScanStatus::Success, vulns, None),
                    Err(e) => (ScanStatus::Failed, Vec::new(), Some(e.to_string())),
                },
                Err(e @ ScanError::Timeout { .. }) => {
                    (ScanStatus::Timeout, Vec::new(), Some(e.to_string()))
                }
                Err(e) => (ScanStatus::Failed, Vec::new(), Some(e.to_string())),
            };
        let duration_secs = started.elapsed().as_secs_f64();

        scan.status = status;
        scan.vulnerabilities = vulnerabilities;
        scan.completed_at = Some(SystemTime::now());
        scan.duration_secs = Some(duration_secs);
        scan.error = error;
        self.store.update(scan.clone()).await?;

        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        if status == ScanStatus::Success {
            info!(
                scan_id = scan.id.as_str(),
                image = image_ref,
                count = scan.vulnerabilities.len(),
                duration_secs,
                "scan completed"
            );
        } else {
            self.scans_failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                scan_id = scan.id.as_str(),
                image = image_ref,
                %status,
                error = scan.error.as_deref().unwrap_or(""),
                "scan did not complete successfully"
            );
        }
        self.record_scan_metrics(&scan, duration_secs);

        let exceptions = self.exceptions.snapshot().await;
        let decision = evaluate(&scan, &exceptions, self.threshold, SystemTime::now());
        let result_label = if decision.should_fail_build { "fail" } else { "pass" };
        counter!(GATE_DECISIONS_TOTAL, LABEL_RESULT => result_label).increment(1);
        if decision.excepted_count > 0 {
            counter!(GATE_EXCEPTED_VULNERABILITIES_TOTAL).increment(decision.excepted_count);
        }

        let event = ScanEvent::new(
            scan.id.clone(),
            image_ref,
            status,
            scan.severity_counts(),
            (status == ScanStatus::Success).then(|| decision.clone()),
            scan.error.clone(),
        );
        // 이벤트 전달 실패가 스캔 결과를 무효화하지는 않음
        if let Err(e) = self.event_tx.try_send(event) {
            warn!(error = %e, "failed to deliver scan event");
        }

        Ok(ScanOutcome { scan, decision })
    }

    fn record_scan_metrics(&self, scan: &ScanResult, duration_secs: f64) {
        let status_label = scan.status.to_string().to_lowercase();
        counter!(
            SCANNER_SCANS_TOTAL,
            LABEL_BACKEND => self.backend.kind(),
            LABEL_STATUS => status_label
        )
        .increment(1);
        histogram!(SCANNER_SCAN_DURATION_SECONDS, LABEL_BACKEND => self.backend.kind())
            .record(duration_secs);

        let counts = scan.severity_counts();
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Unknown,
        ] {
            let found = counts.get(severity);
            if found > 0 {
                counter!(
                    SCANNER_VULNERABILITIES_FOUND_TOTAL,
                    LABEL_SEVERITY => severity.to_string().to_lowercase()
                )
                .increment(found);
            }
        }
    }

    /// 저장된 스캔을 현재 예외 집합으로 다시 판정합니다.
    ///
    /// 스캔 결과는 변경되지 않으며 판정만 새로 계산됩니다.
    pub async fn re_evaluate(&self, scan_id: &str) -> Result<GateDecision, ImagegateError> {
        let scan = self
            .store
            .get(scan_id)
            .await
            .ok_or_else(|| ScanError::NotFound {
                scan_id: scan_id.to_owned(),
            })?;
        let exceptions = self.exceptions.snapshot().await;
        let decision = evaluate(&scan, &exceptions, self.threshold, SystemTime::now());
        info!(
            scan_id,
            fail = decision.should_fail_build,
            excepted = decision.excepted_count,
            "scan re-evaluated"
        );
        Ok(decision)
    }

    /// 스캔 저장소 핸들을 반환합니다.
    pub fn store(&self) -> Arc<ScanStore> {
        Arc::clone(&self.store)
    }

    /// 예외 저장소 핸들을 반환합니다.
    pub fn exceptions(&self) -> Arc<ExceptionStore> {
        Arc::clone(&self.exceptions)
    }

    /// 설정된 게이트 임계값을 반환합니다.
    pub fn threshold(&self) -> GateThreshold {
        self.threshold
    }

    /// 사용 중인 스캐너 백엔드 식별자를 반환합니다.
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// 종료 상태에 도달한 스캔 수를 반환합니다.
    pub fn completed_count(&self) -> u64 {
        self.scans_completed.load(Ordering::Relaxed)
    }

    /// 실패 또는 타임아웃으로 끝난 스캔 수를 반환합니다.
    pub fn failed_count(&self) -> u64 {
        self.scans_failed.load(Ordering::Relaxed)
    }

    /// 현재 진행 중인 스캔 수를 반환합니다.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// 현재 상태명을 반환합니다 (initialized, running, stopped).
    pub async fn state_name(&self) -> &'static str {
        self.state.read().await.name()
    }

    /// 코디네이터를 중지합니다.
    ///
    /// [`Pipeline::stop`]과 동일하지만 `&self`를 받아 `Arc`로 공유된
    /// 상태에서도 호출할 수 있습니다.
    pub async fn shutdown(&self) -> Result<(), ImagegateError> {
        let mut state = self.state.write().await;
        if *state != CoordinatorState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        let in_flight = self.in_flight.lock().await.len();
        if in_flight > 0 {
            warn!(in_flight, "stopping coordinator with scans still in flight");
        }
        *state = CoordinatorState::Stopped;
        info!(
            completed = self.completed_count(),
            failed = self.failed_count(),
            "scan coordinator stopped"
        );
        Ok(())
    }
}

impl<B: ScannerBackend> Pipeline for ScanCoordinator<B> {
    async fn start(&mut self) -> Result<(), ImagegateError> {
        let mut state = self.state.write().await;
        if *state == CoordinatorState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        if !self.backend.is_available().await {
            // 기동은 허용하되 health_check가 Degraded를 보고
            warn!(
                backend = self.backend.kind(),
                "scanner binary unavailable at startup"
            );
        }
        *state = CoordinatorState::Running;
        info!(
            backend = self.backend.kind(),
            threshold = %self.threshold,
            timeout_secs = self.scan_timeout.as_secs(),
            "scan coordinator started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ImagegateError> {
        self.shutdown().await
    }

    async fn health_check(&self) -> HealthStatus {
        match *self.state.read().await {
            CoordinatorState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            CoordinatorState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
            CoordinatorState::Running => {
                if self.backend.is_available().await {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded(format!(
                        "{} binary unavailable",
                        self.backend.kind()
                    ))
                }
            }
        }
    }
}

/// [`ScanCoordinator`] 빌더
///
/// 이벤트 송신자를 외부에서 주입하지 않으면 빌더가 채널을 생성하고
/// 수신자를 함께 반환합니다.
pub struct ScanCoordinatorBuilder<B: ScannerBackend> {
    backend: Option<B>,
    config: ImagegateConfig,
    exceptions: Option<Arc<ExceptionStore>>,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
    event_channel_capacity: usize,
}

impl<B: ScannerBackend> ScanCoordinatorBuilder<B> {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            backend: None,
            config: ImagegateConfig::default(),
            exceptions: None,
            event_tx: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    /// 스캐너 백엔드를 설정합니다 (필수).
    pub fn backend(mut self, backend: B) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 설정을 지정합니다.
    pub fn config(mut self, config: ImagegateConfig) -> Self {
        self.config = config;
        self
    }

    /// 예외 저장소를 설정합니다 (필수).
    pub fn exception_store(mut self, exceptions: Arc<ExceptionStore>) -> Self {
        self.exceptions = Some(exceptions);
        self
    }

    /// 외부 이벤트 송신자를 주입합니다.
    ///
    /// 지정하면 `build`는 수신자를 반환하지 않습니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<ScanEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 내부 생성 이벤트 채널의 용량을 설정합니다.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// 코디네이터를 생성합니다.
    ///
    /// 설정 유효성 검증에 실패하거나 필수 구성 요소가 빠져 있으면
    /// 에러를 반환합니다.
    pub fn build(
        self,
    ) -> Result<(ScanCoordinator<B>, Option<mpsc::Receiver<ScanEvent>>), ImagegateError> {
        self.config.validate()?;
        let backend = self
            .backend
            .ok_or_else(|| PipelineError::InitFailed("scanner backend not set".to_owned()))?;
        let exceptions = self
            .exceptions
            .ok_or_else(|| PipelineError::InitFailed("exception store not set".to_owned()))?;

        let (event_tx, event_rx) = match self.event_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.event_channel_capacity);
                (tx, Some(rx))
            }
        };

        let coordinator = ScanCoordinator {
            backend,
            scan_timeout: Duration::from_secs(self.config.scanner.scan_timeout_secs),
            threshold: self.config.gate_threshold(),
            store: Arc::new(ScanStore::new()),
            exceptions,
            event_tx,
            in_flight: Mutex::new(HashSet::new()),
            state: RwLock::new(CoordinatorState::Initialized),
            scans_completed: Arc::new(AtomicU64::new(0)),
            scans_failed: Arc::new(AtomicU64::new(0)),
        };
        Ok((coordinator, event_rx))
    }
}

impl<B: ScannerBackend> Default for ScanCoordinatorBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagegate_core::error::ScanError;
    use imagegate_scanner::RawScanOutput;

    /// 항상 취약점 없는 성공 보고를 반환하는 백엔드
    #[derive(Debug, Clone)]
    struct StubBackend {
        available: bool,
    }

    impl ScannerBackend for StubBackend {
        fn kind(&self) -> &'static str {
            "trivy"
        }

        async fn version(&self) -> Result<String, ScanError> {
            Ok("0.50.0".to_owned())
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn scan(
            &self,
            _image_ref: &str,
            _timeout: Duration,
        ) -> Result<RawScanOutput, ScanError> {
            Ok(RawScanOutput {
                backend: "trivy".to_owned(),
                stdout: r#"{"Results":[]}"#.to_owned(),
                stderr: String::new(),
                exit_code: Some(0),
                elapsed: Duration::from_millis(5),
            })
        }
    }

    async fn test_exceptions() -> (Arc<ExceptionStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ExceptionStore::load(dir.path().join("exceptions.json"))
            .await
            .unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn builder_creates_coordinator_with_receiver() {
        let (exceptions, _dir) = test_exceptions().await;
        let (coordinator, rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .exception_store(exceptions)
            .build()
            .unwrap();

        assert_eq!(coordinator.state_name().await, "initialized");
        assert!(rx.is_some());
        assert_eq!(coordinator.completed_count(), 0);
        assert_eq!(coordinator.failed_count(), 0);
        assert_eq!(coordinator.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn builder_with_external_event_sender_returns_no_receiver() {
        let (exceptions, _dir) = test_exceptions().await;
        let (tx, _rx) = mpsc::channel(8);
        let (_coordinator, rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .exception_store(exceptions)
            .event_sender(tx)
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn builder_requires_backend() {
        let (exceptions, _dir) = test_exceptions().await;
        let err = ScanCoordinatorBuilder::<StubBackend>::new()
            .exception_store(exceptions)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ImagegateError::Pipeline(PipelineError::InitFailed(_))
        ));
    }

    #[tokio::test]
    async fn builder_requires_exception_store() {
        let err = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ImagegateError::Pipeline(PipelineError::InitFailed(_))
        ));
    }

    #[tokio::test]
    async fn builder_rejects_invalid_config() {
        let (exceptions, _dir) = test_exceptions().await;
        let mut config = ImagegateConfig::default();
        config.scanner.scan_timeout_secs = 0;
        let err = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .config(config)
            .exception_store(exceptions)
            .build()
            .unwrap_err();
        assert!(matches!(err, ImagegateError::Config(_)));
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let (exceptions, _dir) = test_exceptions().await;
        let (mut coordinator, _rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .exception_store(exceptions)
            .build()
            .unwrap();

        assert!(coordinator.health_check().await.is_unhealthy());

        coordinator.start().await.unwrap();
        assert_eq!(coordinator.state_name().await, "running");
        assert!(coordinator.health_check().await.is_healthy());

        coordinator.stop().await.unwrap();
        assert_eq!(coordinator.state_name().await, "stopped");
        assert!(coordinator.health_check().await.is_unhealthy());
    }

    #[tokio::test]
    async fn double_start_fails() {
        let (exceptions, _dir) = test_exceptions().await;
        let (mut coordinator, _rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .exception_store(exceptions)
            .build()
            .unwrap();

        coordinator.start().await.unwrap();
        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(
            err,
            ImagegateError::Pipeline(PipelineError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let (exceptions, _dir) = test_exceptions().await;
        let (mut coordinator, _rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: true })
            .exception_store(exceptions)
            .build()
            .unwrap();

        let err = coordinator.stop().await.unwrap_err();
        assert!(matches!(
            err,
            ImagegateError::Pipeline(PipelineError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn unavailable_backend_reports_degraded_while_running() {
        let (exceptions, _dir) = test_exceptions().await;
        let (mut coordinator, _rx) = ScanCoordinatorBuilder::new()
            .backend(StubBackend { available: false })
            .exception_store(exceptions)
            .build()
            .unwrap();

        coordinator.start().await.unwrap();
        match coordinator.health_check().await {
            HealthStatus::Degraded(reason) => assert!(reason.contains("trivy")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }
}
