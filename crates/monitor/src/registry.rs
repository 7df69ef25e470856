//! 모니터 레지스트리
//!
//! 이름으로 모니터를 관리하고 각 모니터의 스케줄 수명을 함께 관리합니다.
//! 전역 상태 없이 데몬이 `Arc<MonitorRegistry>` 하나를 소유하고
//! 조회 서버와 공유합니다.
//!
//! # 교체와 제거
//! 같은 이름으로 다시 등록하거나 제거하면 이전 모니터의 스케줄을 취소하고
//! 진행 중인 사이클이 끝날 때까지 기다린 뒤 파일 핸들을 닫습니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use logtally_core::config::MonitorConfig;
use logtally_core::metrics as m;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{LookupKind, MonitorError};
use crate::monitor::FileMonitor;
use crate::rule::Rule;
use crate::scheduler::{ScheduleHandle, Scheduler};

/// [`MonitorRegistry::apply`] 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    /// 새 모니터를 등록함
    Added,
    /// 기존 모니터의 파일 경로나 규칙을 제자리에서 갱신함
    Updated,
    /// 기존 모니터를 새 인스턴스로 교체함
    Replaced,
    /// 변경 사항 없음
    Unchanged,
}

struct Entry {
    monitor: Arc<FileMonitor>,
    schedule: ScheduleHandle,
}

/// 이름 → 모니터 매핑과 스케줄 관리
pub struct MonitorRegistry {
    scheduler: Scheduler,
    default_block_size: usize,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MonitorRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new(scheduler: Scheduler, default_block_size: usize) -> Self {
        Self {
            scheduler,
            default_block_size,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// 엔진 설정에서 레지스트리를 생성합니다.
    ///
    /// # Errors
    /// 설정 검증에 실패하면 [`MonitorError::Config`]
    pub fn from_config(config: &EngineConfig) -> Result<Self, MonitorError> {
        let scheduler = Scheduler::from_config(config)?;
        Ok(Self::new(scheduler, config.default_block_size))
    }

    /// 모니터 정의에 블록 크기가 없을 때 쓰는 값
    pub fn default_block_size(&self) -> usize {
        self.default_block_size
    }

    /// 모니터를 등록하고 스케줄을 시작합니다.
    ///
    /// 같은 이름의 모니터가 있으면 먼저 그 스케줄을 멈추고 핸들을 닫습니다.
    /// 이전 모니터는 맵에서 먼저 빠진 뒤 진행 중인 사이클을 기다리므로,
    /// 그 사이 도착한 같은 이름의 조회는 [`MonitorError::NotFound`]를 받습니다.
    pub async fn add(&self, monitor: FileMonitor) -> Arc<FileMonitor> {
        let name = monitor.name().to_owned();

        let previous = self.entries.write().await.remove(&name);
        if let Some(old) = previous {
            retire(&name, old).await;
            info!(monitor = %name, "monitor replaced");
        }

        let monitor = Arc::new(monitor);
        let schedule = self.scheduler.spawn(Arc::clone(&monitor));
        let raced = self.entries.write().await.insert(
            name.clone(),
            Entry {
                monitor: Arc::clone(&monitor),
                schedule,
            },
        );
        if let Some(old) = raced {
            retire(&name, old).await;
        }

        info!(monitor = %name, filename = %monitor.filename().await.display(), "monitor added");
        self.record_active().await;
        monitor
    }

    /// 이름으로 모니터를 찾습니다.
    ///
    /// # Errors
    /// 등록되지 않은 이름이면 [`MonitorError::NotFound`]
    pub async fn get(&self, name: &str) -> Result<Arc<FileMonitor>, MonitorError> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|entry| Arc::clone(&entry.monitor))
            .ok_or_else(|| MonitorError::not_found(LookupKind::Monitor, name))
    }

    /// 등록된 모니터 목록 (이름순)
    pub async fn list(&self) -> Vec<Arc<FileMonitor>> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.monitor))
            .collect()
    }

    /// 등록된 모니터 이름 (이름순)
    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// 등록된 모니터 수
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 등록된 모니터가 없는지 여부
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 모니터를 제거합니다. 스케줄을 멈추고 파일 핸들을 닫습니다.
    ///
    /// # Errors
    /// 등록되지 않은 이름이면 [`MonitorError::NotFound`]
    pub async fn remove(&self, name: &str) -> Result<(), MonitorError> {
        let entry = self
            .entries
            .write()
            .await
            .remove(name)
            .ok_or_else(|| MonitorError::not_found(LookupKind::Monitor, name))?;

        retire(name, entry).await;
        info!(monitor = %name, "monitor removed");
        self.record_active().await;
        Ok(())
    }

    /// 설정 항목 하나를 레지스트리에 반영합니다.
    ///
    /// 블록 크기와 시작 위치가 같은 기존 모니터는 제자리에서 갱신되어
    /// 카운터와 스토어가 유지됩니다. 그 외에는 새 인스턴스로 교체합니다.
    /// 교체([`ApplyAction::Replaced`])는 [`add`](Self::add)를 거치므로 교체가 끝날
    /// 때까지 해당 이름의 조회가 잠시 [`MonitorError::NotFound`]를 받을 수 있습니다.
    /// 제자리 갱신에는 이런 공백이 없습니다.
    ///
    /// # Errors
    /// 규칙 컴파일 또는 모니터 생성에 실패하면 기존 모니터는 그대로 둡니다.
    pub async fn apply(&self, config: &MonitorConfig) -> Result<ApplyAction, MonitorError> {
        let block_size = config.block_size.unwrap_or(self.default_block_size);

        let existing = match self.get(&config.name).await {
            Ok(monitor) => monitor,
            Err(_) => {
                let monitor = FileMonitor::from_config(config, self.default_block_size)?;
                self.add(monitor).await;
                return Ok(ApplyAction::Added);
            }
        };

        if existing.block_size() != block_size || existing.start_at() != config.start_at {
            let monitor = FileMonitor::from_config(config, self.default_block_size)?;
            self.add(monitor).await;
            return Ok(ApplyAction::Replaced);
        }

        // 규칙을 먼저 컴파일해 실패 시 아무것도 바꾸지 않음
        let rules = config
            .rules
            .iter()
            .map(Rule::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut action = ApplyAction::Unchanged;
        if existing.filename().await != Path::new(&config.filename) {
            existing.set_filename(&config.filename).await;
            action = ApplyAction::Updated;
        }
        if existing.rules().await != config.rules {
            existing.replace_rules(rules).await;
            action = ApplyAction::Updated;
        }

        if action == ApplyAction::Updated {
            info!(monitor = %config.name, "monitor updated in place");
        }
        Ok(action)
    }

    /// `names`에 없는 모니터를 모두 제거하고 제거된 이름을 반환합니다.
    pub async fn retain_names(&self, names: &[String]) -> Vec<String> {
        let removed: Vec<(String, Entry)> = {
            let mut entries = self.entries.write().await;
            let stale: Vec<String> = entries
                .keys()
                .filter(|name| !names.contains(*name))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|name| entries.remove(&name).map(|entry| (name, entry)))
                .collect()
        };

        let mut removed_names = Vec::with_capacity(removed.len());
        for (name, entry) in removed {
            retire(&name, entry).await;
            info!(monitor = %name, "monitor removed");
            removed_names.push(name);
        }

        self.record_active().await;
        removed_names
    }

    /// 모든 모니터를 제거합니다.
    pub async fn shutdown(&self) {
        let entries = std::mem::take(&mut *self.entries.write().await);
        let count = entries.len();

        for (name, entry) in entries {
            retire(&name, entry).await;
        }

        metrics::gauge!(m::MONITORS_ACTIVE).set(0.0);
        info!(count, "monitor registry shut down");
    }

    async fn record_active(&self) {
        let count = self.len().await;
        metrics::gauge!(m::MONITORS_ACTIVE).set(count as f64);
    }
}

impl std::fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRegistry")
            .field("scheduler", &self.scheduler)
            .field("default_block_size", &self.default_block_size)
            .finish_non_exhaustive()
    }
}

/// 스케줄을 멈추고 진행 중인 사이클을 기다린 뒤 핸들을 닫습니다.
async fn retire(name: &str, entry: Entry) {
    entry.schedule.shutdown().await;
    entry.monitor.close().await;
    tracing::debug!(monitor = %name, "monitor retired");
}
