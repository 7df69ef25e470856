//! 읽기 전용 조회
//!
//! 레지스트리와 모니터 상태를 이름 경로로 조회합니다.
//! 모든 조회는 모니터 잠금 하에서 복사한 스냅샷을 반환합니다.
//! 존재하지 않는 모니터, 카운터, 스토어는 [`MonitorError::NotFound`]입니다.

use std::path::PathBuf;

use crate::error::MonitorError;
use crate::monitor::MonitorSnapshot;
use crate::registry::MonitorRegistry;

/// 모니터 목록 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    /// 모니터 이름
    pub name: String,
    /// 현재 파일 경로
    pub filename: PathBuf,
}

impl MonitorRegistry {
    /// 모든 모니터의 `(이름, 파일 경로)` 목록 (이름순)
    pub async fn summaries(&self) -> Vec<MonitorSummary> {
        let mut summaries = Vec::new();
        for monitor in self.list().await {
            summaries.push(MonitorSummary {
                name: monitor.name().to_owned(),
                filename: monitor.filename().await,
            });
        }
        summaries
    }

    /// 모니터의 카운터 이름 목록
    pub async fn counter_names(&self, monitor: &str) -> Result<Vec<String>, MonitorError> {
        Ok(self.get(monitor).await?.counter_names().await)
    }

    /// 모니터의 스토어 이름 목록
    pub async fn store_names(&self, monitor: &str) -> Result<Vec<String>, MonitorError> {
        Ok(self.get(monitor).await?.store_names().await)
    }

    /// 카운터 값
    pub async fn counter_value(&self, monitor: &str, counter: &str) -> Result<u64, MonitorError> {
        self.get(monitor).await?.counter(counter).await
    }

    /// 스토어 라인 목록 (삽입 순서)
    pub async fn store_lines(
        &self,
        monitor: &str,
        store: &str,
    ) -> Result<Vec<String>, MonitorError> {
        self.get(monitor).await?.store(store).await
    }

    /// 모니터 전체 상태 스냅샷
    pub async fn snapshot(&self, monitor: &str) -> Result<MonitorSnapshot, MonitorError> {
        Ok(self.get(monitor).await?.snapshot().await)
    }
}
