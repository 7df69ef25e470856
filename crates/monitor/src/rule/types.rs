//! 규칙 평가 결과 타입

/// 규칙 매칭 시 모니터가 적용할 부수 효과
///
/// 규칙은 공유 상태를 직접 바꾸지 않고 효과 목록만 보고합니다.
/// 모니터가 목록 순서대로 적용합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// 카운터를 1 증가
    IncrementCounter(String),
    /// 스토어에 라인 추가
    AppendStore(String),
}

impl Effect {
    /// 효과 대상 이름을 반환합니다.
    pub fn target(&self) -> &str {
        match self {
            Self::IncrementCounter(name) | Self::AppendStore(name) => name,
        }
    }
}

/// 규칙 매칭 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch<'r> {
    /// 기록할 라인 (캡처 그룹이 있으면 그룹을 공백으로 이은 문자열)
    pub line: String,
    /// 적용할 효과 목록 (카운터 먼저, 그다음 스토어)
    pub effects: &'r [Effect],
    /// 이후 규칙 평가 중단 여부
    pub stop: bool,
}
