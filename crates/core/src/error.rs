//! 에러 타입 — 도메인별 에러 정의

/// Imagegate 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ImagegateError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 스캔 실행 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// 게이트 판정/예외 관리 에러
    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중인 파이프라인을 다시 시작함
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 중지함
    #[error("pipeline not running")]
    NotRunning,
}

/// 스캔 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 스캐너 바이너리를 찾을 수 없거나 실행 불가
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    /// 제한 시간 초과 — 외부 프로세스는 종료됨
    #[error("scan timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// 스캐너 프로세스가 비정상 종료됨
    #[error("scanner execution failed: {0}")]
    ExecutionFailed(String),

    /// 스캐너 출력 파싱 실패
    #[error("malformed scanner output: {0}")]
    MalformedOutput(String),

    /// 유효하지 않은 이미지 참조
    #[error("invalid image reference '{image}': {reason}")]
    InvalidImage { image: String, reason: String },

    /// 동일 이미지에 대한 스캔이 이미 진행 중
    #[error("scan already in flight for {image_ref}")]
    InFlight { image_ref: String },

    /// 요청한 스캔을 찾을 수 없음
    #[error("scan not found: {scan_id}")]
    NotFound { scan_id: String },

    /// 허용되지 않는 스캔 상태 전환 (종료 상태는 불변)
    #[error("invalid scan status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// 게이트 판정/예외 관리 에러
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// 요청한 예외를 찾을 수 없음
    #[error("exception not found: {exception_id}")]
    ExceptionNotFound { exception_id: String },

    /// 예외 저장소 영속화 실패
    #[error("exception store persist failed: {0}")]
    Persist(String),

    /// 유효하지 않은 예외 정의
    #[error("invalid exception: {0}")]
    InvalidException(String),
}
