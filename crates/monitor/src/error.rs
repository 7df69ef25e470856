//! 모니터 엔진 에러 타입
//!
//! [`MonitorError`]는 규칙 생성, 파일 테일링, 조회 과정의 모든 에러를 표현합니다.
//! `From<MonitorError> for LogtallyError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logtally_core::error::LogtallyError;

/// 조회 대상 종류 ([`MonitorError::NotFound`]에서 사용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// 모니터
    Monitor,
    /// 카운터
    Counter,
    /// 스토어
    Store,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monitor => write!(f, "monitor"),
            Self::Counter => write!(f, "counter"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// 모니터 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 정규식 컴파일 실패 (규칙 생성 시점)
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// 문제가 된 패턴
        pattern: String,
        /// 컴파일 실패 사유
        reason: String,
    },

    /// 파일 열기/읽기 실패 (복구 가능, 다음 사이클에서 재시도)
    #[error("file unavailable: {path}: {reason}")]
    FileUnavailable {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 존재하지 않는 모니터/카운터/스토어 조회
    #[error("{kind} not found: {name}")]
    NotFound {
        /// 조회 대상 종류
        kind: LookupKind,
        /// 조회한 이름
        name: String,
    },

    /// 규칙 삽입/삭제 위치가 범위를 벗어남
    #[error("rule index {index} out of range (rules: {len})")]
    RuleIndex {
        /// 요청한 위치
        index: usize,
        /// 현재 규칙 수
        len: usize,
    },

    /// 모니터 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// `NotFound` 에러를 생성합니다.
    pub fn not_found(kind: LookupKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// 조회 실패 여부를 반환합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<MonitorError> for LogtallyError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Io(e) => LogtallyError::Io(e),
            other => LogtallyError::Monitor(other.to_string()),
        }
    }
}
