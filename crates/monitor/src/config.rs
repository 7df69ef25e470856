//! 모니터 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`SchedulerConfig`](logtally_core::config::SchedulerConfig)를
//! 기반으로 스케줄러와 레지스트리가 쓰는 값을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logtally_core::config::LogtallyConfig;
//! use logtally_monitor::config::EngineConfig;
//!
//! let core_config = LogtallyConfig::default();
//! let config = EngineConfig::from_core(&core_config.scheduler);
//! ```

use std::time::Duration;

use logtally_core::config::{MAX_BLOCK_SIZE, MAX_POLL_INTERVAL_SECS, SchedulerConfig};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// 기본 폴링 주기 (초)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// 기본 블록 크기 (바이트)
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// 모니터 엔진 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 모니터당 읽기 사이클 주기 (초)
    pub poll_interval_secs: u64,
    /// 모니터 정의에 블록 크기가 없을 때 쓰는 값
    pub default_block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            default_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl EngineConfig {
    /// core의 `SchedulerConfig`에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &SchedulerConfig) -> Self {
        Self {
            poll_interval_secs: core.poll_interval_secs,
            default_block_size: core.default_block_size,
        }
    }

    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(MonitorError::Config {
                field: "poll_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_SECS}"),
            });
        }

        if self.default_block_size == 0 || self.default_block_size > MAX_BLOCK_SIZE {
            return Err(MonitorError::Config {
                field: "default_block_size".to_owned(),
                reason: format!("must be 1-{MAX_BLOCK_SIZE}"),
            });
        }

        Ok(())
    }
}

/// 엔진 설정 빌더
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 폴링 주기(초)를 설정합니다.
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    /// 기본 블록 크기를 설정합니다.
    pub fn default_block_size(mut self, size: usize) -> Self {
        self.config.default_block_size = size;
        self
    }

    /// 설정을 검증하고 `EngineConfig`를 생성합니다.
    pub fn build(self) -> Result<EngineConfig, MonitorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
