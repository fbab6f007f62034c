//! 설정 관리 — imagegate.toml 파싱 및 런타임 설정
//!
//! [`ImagegateConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IMAGEGATE_SCANNER_BACKEND=clair` 형식)
//! 3. 설정 파일 (`imagegate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), imagegate_core::error::ImagegateError> {
//! use imagegate_core::config::ImagegateConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ImagegateConfig::load("imagegate.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ImagegateConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ImagegateError};
use crate::types::GateThreshold;

/// Imagegate 통합 설정
///
/// `imagegate.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagegateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스캐너 백엔드 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 게이트 판정 설정
    #[serde(default)]
    pub gate: GateConfig,
    /// HTTP API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ImagegateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ImagegateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ImagegateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImagegateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ImagegateError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ImagegateError> {
        toml::from_str(toml_str).map_err(|e| {
            ImagegateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IMAGEGATE_{SECTION}_{FIELD}`
    /// 예: `IMAGEGATE_SCANNER_BACKEND=clair`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IMAGEGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IMAGEGATE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "IMAGEGATE_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "IMAGEGATE_GENERAL_PID_FILE");

        // Scanner
        override_string(&mut self.scanner.backend, "IMAGEGATE_SCANNER_BACKEND");
        override_string(&mut self.scanner.trivy_path, "IMAGEGATE_SCANNER_TRIVY_PATH");
        override_string(
            &mut self.scanner.clairctl_path,
            "IMAGEGATE_SCANNER_CLAIRCTL_PATH",
        );
        override_u64(
            &mut self.scanner.scan_timeout_secs,
            "IMAGEGATE_SCANNER_SCAN_TIMEOUT_SECS",
        );

        // Gate
        override_string(
            &mut self.gate.severity_threshold,
            "IMAGEGATE_GATE_SEVERITY_THRESHOLD",
        );
        override_string(
            &mut self.gate.exceptions_path,
            "IMAGEGATE_GATE_EXCEPTIONS_PATH",
        );

        // API
        override_bool(&mut self.api.enabled, "IMAGEGATE_API_ENABLED");
        override_string(&mut self.api.bind, "IMAGEGATE_API_BIND");

        // Metrics
        override_bool(&mut self.metrics.enabled, "IMAGEGATE_METRICS_ENABLED");
        override_string(&mut self.metrics.bind, "IMAGEGATE_METRICS_BIND");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ImagegateError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // backend 검증
        let valid_backends = ["trivy", "clair"];
        if !valid_backends.contains(&self.scanner.backend.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "scanner.backend".to_owned(),
                reason: format!("must be one of: {}", valid_backends.join(", ")),
            }
            .into());
        }

        // scan_timeout_secs 검증
        if self.scanner.scan_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanner.scan_timeout_secs".to_owned(),
                reason: "must be greater than zero".to_owned(),
            }
            .into());
        }

        // severity_threshold 검증
        if GateThreshold::from_str_loose(&self.gate.severity_threshold).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "gate.severity_threshold".to_owned(),
                reason: "must be one of: low, medium, high, critical".to_owned(),
            }
            .into());
        }

        // bind 주소 검증
        if self.api.enabled && self.api.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "api.bind".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.api.bind),
            }
            .into());
        }
        if self.metrics.enabled && self.metrics.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "metrics.bind".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.metrics.bind),
            }
            .into());
        }

        Ok(())
    }

    /// 설정된 게이트 임계값을 반환합니다.
    ///
    /// `validate()`를 통과한 설정에서만 호출해야 합니다. 파싱 불가 시
    /// 가장 보수적인 `Low`를 사용합니다.
    pub fn gate_threshold(&self) -> GateThreshold {
        GateThreshold::from_str_loose(&self.gate.severity_threshold)
            .unwrap_or(GateThreshold::Low)
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/imagegate".to_owned(),
            pid_file: "/var/run/imagegate.pid".to_owned(),
        }
    }
}

/// 스캐너 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 사용할 백엔드 (trivy, clair)
    pub backend: String,
    /// trivy 바이너리 경로
    pub trivy_path: String,
    /// clairctl 바이너리 경로
    pub clairctl_path: String,
    /// 스캔 제한 시간 (초)
    pub scan_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            backend: "trivy".to_owned(),
            trivy_path: "trivy".to_owned(),
            clairctl_path: "clairctl".to_owned(),
            scan_timeout_secs: 300,
        }
    }
}

/// 게이트 판정 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// 빌드 실패 임계값 (low, medium, high, critical)
    pub severity_threshold: String,
    /// 예외 저장 파일 경로 (JSON)
    pub exceptions_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            severity_threshold: "high".to_owned(),
            exceptions_path: "/var/lib/imagegate/exceptions.json".to_owned(),
        }
    }
}

/// HTTP API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8080".to_owned(),
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// Prometheus 익스포터 수신 주소
    pub bind: String,
    /// 노출 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:9090".to_owned(),
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
