//! 규칙 -- 정규식 하나와 카운터/스토어 대상, 중단 플래그의 묶음
//!
//! [`Rule`]은 생성 후 바뀌지 않으며, 라인 하나를 평가해
//! 적용할 효과([`Effect`])와 중단 여부만 보고합니다.
//!
//! # 캡처 그룹 치환
//! 패턴에 캡처 그룹이 있으면 스토어에 기록되는 라인은 원본 라인이 아니라
//! 캡처된 그룹들을 공백 하나로 이은 문자열입니다.
//!
//! ```
//! use logtally_monitor::rule::Rule;
//!
//! let rule = Rule::new(r"ERROR:\s*(.*)$", vec!["errors".into()], vec!["errors".into()], true)?;
//! let m = rule.evaluate("ERROR: disk full").expect("should match");
//! assert_eq!(m.line, "disk full");
//! assert!(m.stop);
//! # Ok::<(), logtally_monitor::MonitorError>(())
//! ```

pub mod types;

pub use types::{Effect, RuleMatch};

use logtally_core::config::RuleConfig;
use regex::Regex;

use crate::error::MonitorError;

/// 정규식 기반 분류 규칙
#[derive(Debug, Clone)]
pub struct Rule {
    /// 컴파일된 패턴
    regex: Regex,
    /// 카운터 대상 (순서 유지, 중복 허용)
    counters: Vec<String>,
    /// 스토어 대상 (순서 유지)
    stores: Vec<String>,
    /// 카운터 효과 다음에 스토어 효과가 오는 평가용 목록
    effects: Vec<Effect>,
    /// 매칭 시 이후 규칙 평가 중단
    stop: bool,
}

impl Rule {
    /// 새 규칙을 생성합니다.
    ///
    /// # Errors
    /// 패턴이 올바른 정규식이 아니면 [`MonitorError::InvalidPattern`]
    pub fn new(
        pattern: &str,
        counters: Vec<String>,
        stores: Vec<String>,
        stop: bool,
    ) -> Result<Self, MonitorError> {
        let regex = Regex::new(pattern).map_err(|e| MonitorError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;

        let effects = counters
            .iter()
            .cloned()
            .map(Effect::IncrementCounter)
            .chain(stores.iter().cloned().map(Effect::AppendStore))
            .collect();

        Ok(Self {
            regex,
            counters,
            stores,
            effects,
            stop,
        })
    }

    /// 설정의 규칙 정의에서 규칙을 생성합니다.
    pub fn from_config(config: &RuleConfig) -> Result<Self, MonitorError> {
        Self::new(
            &config.pattern,
            config.counters.clone(),
            config.stores.clone(),
            config.stop,
        )
    }

    /// 규칙을 설정 형태로 되돌립니다.
    pub fn to_config(&self) -> RuleConfig {
        RuleConfig {
            pattern: self.pattern().to_owned(),
            counters: self.counters.clone(),
            stores: self.stores.clone(),
            stop: self.stop,
        }
    }

    /// 원본 패턴 문자열
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// 카운터 대상 목록
    pub fn counters(&self) -> &[String] {
        &self.counters
    }

    /// 스토어 대상 목록
    pub fn stores(&self) -> &[String] {
        &self.stores
    }

    /// 중단 플래그
    pub fn stop(&self) -> bool {
        self.stop
    }

    /// 라인 하나를 평가합니다.
    ///
    /// 매칭되지 않으면 `None`을 반환하며, 이 경우 `stop` 플래그와 무관하게
    /// 다음 규칙 평가가 계속됩니다.
    pub fn evaluate(&self, line: &str) -> Option<RuleMatch<'_>> {
        // 그룹 0(전체 매칭)만 있으면 캡처 없이 검색만 수행
        let recorded = if self.regex.captures_len() > 1 {
            let caps = self.regex.captures(line)?;
            caps.iter()
                .skip(1)
                .map(|group| group.map_or("", |m| m.as_str()))
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            if !self.regex.is_match(line) {
                return None;
            }
            line.to_owned()
        };

        Some(RuleMatch {
            line: recorded,
            effects: &self.effects,
            stop: self.stop,
        })
    }
}
