#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 정규식 규칙과 매칭 효과
//! - [`monitor`]: 파일 테일링 상태 머신과 카운터/스토어를 소유하는 모니터
//! - [`scheduler`]: 모니터별 고정 주기 폴링 태스크
//! - [`registry`]: 이름 → 모니터 매핑과 스케줄 수명 관리
//! - [`query`]: 읽기 전용 조회
//! - [`config`]: 엔진 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Scheduler --tick--> FileMonitor::read --> Tail --lines--> Rule::evaluate
//!                          |                                     |
//!                     Mutex<state>  <------- effects ------------+
//!                          ^
//!       MonitorRegistry ---+--- query (snapshot reads)
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod query;
pub mod registry;
pub mod rule;
pub mod scheduler;

// --- 주요 타입 re-export ---

// 설정
pub use config::{EngineConfig, EngineConfigBuilder};

// 에러
pub use error::{LookupKind, MonitorError};

// 모니터
pub use monitor::{FileMonitor, MonitorSnapshot, ReadOutcome, TailState};

// 규칙
pub use rule::{Effect, Rule, RuleMatch};

// 스케줄러
pub use scheduler::{ScheduleHandle, Scheduler};

// 레지스트리와 조회
pub use query::MonitorSummary;
pub use registry::{ApplyAction, MonitorRegistry};
