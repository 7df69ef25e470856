//! 설정 관리 -- logtally.toml 파싱 및 런타임 설정
//!
//! [`LogtallyConfig`]는 데몬과 모니터 엔진의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGTALLY_SERVER_PORT=9000` 형식)
//! 3. 설정 파일 (`logtally.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logtally_core::error::LogtallyError> {
//! use logtally_core::config::LogtallyConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogtallyConfig::load("logtally.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogtallyConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogtallyError};

/// 폴링 주기 상한 (초)
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// 사이클당 읽기 블록 크기 상한 (바이트)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// logtally 통합 설정
///
/// `logtally.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogtallyConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 폴링 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 조회 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 모니터 정의 목록
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
}

impl LogtallyConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogtallyError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogtallyError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogtallyError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogtallyError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogtallyError> {
        toml::from_str(toml_str).map_err(|e| {
            LogtallyError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGTALLY_{SECTION}_{FIELD}`
    /// 예: `LOGTALLY_SERVER_PORT=9000`
    ///
    /// `monitors` 목록은 파일로만 정의합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGTALLY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGTALLY_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LOGTALLY_GENERAL_PID_FILE");

        // Scheduler
        override_u64(
            &mut self.scheduler.poll_interval_secs,
            "LOGTALLY_SCHEDULER_POLL_INTERVAL_SECS",
        );
        override_usize(
            &mut self.scheduler.default_block_size,
            "LOGTALLY_SCHEDULER_DEFAULT_BLOCK_SIZE",
        );

        // Server
        override_bool(&mut self.server.enabled, "LOGTALLY_SERVER_ENABLED");
        override_string(&mut self.server.listen_addr, "LOGTALLY_SERVER_LISTEN_ADDR");
        override_u16(&mut self.server.port, "LOGTALLY_SERVER_PORT");
        override_usize(
            &mut self.server.max_connections,
            "LOGTALLY_SERVER_MAX_CONNECTIONS",
        );
        override_u64(
            &mut self.server.request_timeout_secs,
            "LOGTALLY_SERVER_REQUEST_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGTALLY_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGTALLY_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGTALLY_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogtallyError> {
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

        if self.scheduler.poll_interval_secs == 0
            || self.scheduler.poll_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_SECS}"),
            }
            .into());
        }

        validate_block_size(
            self.scheduler.default_block_size,
            "scheduler.default_block_size",
        )?;

        if self.server.enabled {
            if self.server.port == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.port".to_owned(),
                    reason: "port must not be 0 when the query server is enabled".to_owned(),
                }
                .into());
            }
            if self.server.max_connections == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.max_connections".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
            if self.server.request_timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "server.request_timeout_secs".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "port must not be 0 when metrics are enabled".to_owned(),
            }
            .into());
        }

        let mut seen_names = HashSet::new();
        for (idx, monitor) in self.monitors.iter().enumerate() {
            monitor.validate(idx)?;
            if !seen_names.insert(monitor.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("monitors[{idx}].name"),
                    reason: format!("duplicate monitor name '{}'", monitor.name),
                }
                .into());
            }
        }

        Ok(())
    }

    /// 모니터의 실제 블록 크기를 반환합니다 (미지정 시 스케줄러 기본값).
    pub fn block_size_for(&self, monitor: &MonitorConfig) -> usize {
        monitor
            .block_size
            .unwrap_or(self.scheduler.default_block_size)
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
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 폴링 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 모니터별 읽기 사이클 주기 (초)
    pub poll_interval_secs: u64,
    /// 모니터에 `block_size`가 없을 때 사용할 사이클당 읽기 크기 (바이트)
    pub default_block_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            default_block_size: 8192,
        }
    }
}

/// 조회 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 요청 헤더 수신 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 8088,
            max_connections: 64,
            request_timeout_secs: 10,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
        }
    }
}

/// 새로 연 파일 핸들의 읽기 시작 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// 파일 끝에서 시작 (기존 내용은 재생하지 않음, 기본값)
    #[default]
    End,
    /// 파일 처음부터 읽음
    Beginning,
}

/// 모니터 정의 -- 하나의 `[[monitors]]` 테이블에 대응합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 모니터 이름 (설정 내에서 유일)
    pub name: String,
    /// 감시할 파일 경로
    pub filename: String,
    /// 사이클당 읽기 크기 (바이트), 없으면 `scheduler.default_block_size`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<usize>,
    /// 파일을 새로 열었을 때 읽기 시작 위치
    #[serde(default)]
    pub start_at: StartPosition,
    /// 규칙 목록 (순서대로 평가됨)
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl MonitorConfig {
    /// 모니터 정의를 검증합니다. `idx`는 에러 메시지의 필드 경로에 사용됩니다.
    pub fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("monitors[{idx}].name"),
                reason: "monitor name must not be empty".to_owned(),
            });
        }

        // 조회 경로의 세그먼트로 쓰이므로 '/'를 허용하지 않음
        if self.name.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: format!("monitors[{idx}].name"),
                reason: format!("monitor name '{}' must not contain '/'", self.name),
            });
        }

        if self.filename.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("monitors[{idx}].filename"),
                reason: "filename must not be empty".to_owned(),
            });
        }

        if let Some(block_size) = self.block_size {
            validate_block_size(block_size, &format!("monitors[{idx}].block_size"))?;
        }

        for (rule_idx, rule) in self.rules.iter().enumerate() {
            if rule.pattern.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("monitors[{idx}].rules[{rule_idx}].pattern"),
                    reason: "pattern must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// 규칙 정의 -- 하나의 `[[monitors.rules]]` 테이블에 대응합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// 정규식 패턴 (라인 어디서든 매칭)
    pub pattern: String,
    /// 매칭 시 증가시킬 카운터 이름 (순서 유지, 중복 허용)
    #[serde(default)]
    pub counters: Vec<String>,
    /// 매칭 시 라인을 추가할 스토어 이름 (순서 유지)
    #[serde(default)]
    pub stores: Vec<String>,
    /// 매칭 시 이후 규칙 평가 중단 여부
    #[serde(default)]
    pub stop: bool,
}

fn validate_block_size(block_size: usize, field: &str) -> Result<(), ConfigError> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("must be 1-{MAX_BLOCK_SIZE}"),
        });
    }
    Ok(())
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

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
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

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn sample_monitor() -> MonitorConfig {
        MonitorConfig {
            name: "app".to_owned(),
            filename: "/tmp/app.log".to_owned(),
            block_size: None,
            start_at: StartPosition::End,
            rules: vec![RuleConfig {
                pattern: r"ERROR:\s*(.*)$".to_owned(),
                counters: vec!["errors".to_owned()],
                stores: vec!["errors".to_owned()],
                stop: true,
            }],
        }
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = LogtallyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.default_block_size, 8192);
        assert!(config.server.enabled);
        assert!(!config.metrics.enabled);
        assert!(config.monitors.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        LogtallyConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = LogtallyConfig::parse("").unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.scheduler.poll_interval_secs, 5);
    }

    #[test]
    fn from_str_monitors_with_rules() {
        let toml = r#"
[scheduler]
poll_interval_secs = 2

[[monitors]]
name = "junk"
filename = "/tmp/junk.txt"
block_size = 4096
start_at = "beginning"

[[monitors.rules]]
pattern = 'ERROR:\s*(.*)$'
counters = ["errors", "errors"]
stores = ["errors"]
stop = true

[[monitors.rules]]
pattern = 'WARNING:\s*(.*)$'
counters = ["warnings"]

[[monitors]]
name = "auth"
filename = "/var/log/auth.log"
"#;
        let config = LogtallyConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.monitors.len(), 2);

        let junk = &config.monitors[0];
        assert_eq!(junk.block_size, Some(4096));
        assert_eq!(junk.start_at, StartPosition::Beginning);
        assert_eq!(junk.rules.len(), 2);
        assert_eq!(junk.rules[0].counters, vec!["errors", "errors"]);
        assert!(junk.rules[0].stop);
        assert!(!junk.rules[1].stop);
        assert!(junk.rules[1].stores.is_empty());

        let auth = &config.monitors[1];
        assert_eq!(auth.start_at, StartPosition::End);
        assert_eq!(config.block_size_for(auth), 8192);
        assert_eq!(config.block_size_for(junk), 4096);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = LogtallyConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            LogtallyError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = LogtallyConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = LogtallyConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = LogtallyConfig::default();
        config.scheduler.poll_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn validate_rejects_oversized_block() {
        let mut config = LogtallyConfig::default();
        let mut monitor = sample_monitor();
        monitor.block_size = Some(MAX_BLOCK_SIZE + 1);
        config.monitors.push(monitor);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitors[0].block_size"));
    }

    #[test]
    fn validate_rejects_duplicate_monitor_names() {
        let mut config = LogtallyConfig::default();
        config.monitors.push(sample_monitor());
        config.monitors.push(sample_monitor());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate monitor name"));
    }

    #[test]
    fn validate_rejects_empty_name_and_slash() {
        let mut monitor = sample_monitor();
        monitor.name = "  ".to_owned();
        assert!(monitor.validate(0).is_err());

        monitor.name = "a/b".to_owned();
        assert!(monitor.validate(0).is_err());
    }

    #[test]
    fn validate_rejects_empty_pattern() {
        let mut monitor = sample_monitor();
        monitor.rules[0].pattern = String::new();
        let err = monitor.validate(3).unwrap_err();
        assert!(err.to_string().contains("monitors[3].rules[0].pattern"));
    }

    #[test]
    fn validate_rejects_zero_server_port_only_when_enabled() {
        let mut config = LogtallyConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_override_applies_scalar_fields() {
        // SAFETY: #[serial]로 환경변수를 다루는 테스트를 직렬화합니다.
        unsafe {
            std::env::set_var("LOGTALLY_SERVER_PORT", "9000");
            std::env::set_var("LOGTALLY_SCHEDULER_POLL_INTERVAL_SECS", "1");
        }
        let mut config = LogtallyConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.scheduler.poll_interval_secs, 1);
        unsafe {
            std::env::remove_var("LOGTALLY_SERVER_PORT");
            std::env::remove_var("LOGTALLY_SCHEDULER_POLL_INTERVAL_SECS");
        }
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: #[serial]로 환경변수를 다루는 테스트를 직렬화합니다.
        unsafe { std::env::set_var("TEST_LOGTALLY_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_LOGTALLY_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_LOGTALLY_BOOL_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_LOGTALLY_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = LogtallyConfig::default();
        config.monitors.push(sample_monitor());
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = LogtallyConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.monitors, config.monitors);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = LogtallyConfig::from_file("/nonexistent/path/logtally.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogtallyError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
