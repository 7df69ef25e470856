//! 파일 모니터 -- 파일 하나의 테일링 상태, 규칙, 카운터, 스토어를 소유합니다.
//!
//! 모든 가변 상태는 하나의 [`tokio::sync::Mutex`] 뒤에 있으며,
//! 읽기 사이클 전체와 모든 조회가 같은 잠금을 잡습니다.
//! 따라서 조회는 항상 완전히 적용된 사이클 사이의 상태만 관찰합니다.

pub mod tail;

pub use tail::{Tail, TailBatch, TailState};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

use logtally_core::config::{MonitorConfig, RuleConfig, StartPosition};
use logtally_core::metrics as m;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LookupKind, MonitorError};
use crate::rule::{Effect, Rule};

/// 한 번의 읽기 사이클 결과
#[derive(Debug)]
pub enum ReadOutcome {
    /// 파일을 열거나 읽을 수 없음 (다음 사이클에서 재시도)
    Unavailable(MonitorError),
    /// 새로 읽은 바이트 없음
    Idle,
    /// 바이트를 읽고 완성 라인을 처리함
    Read {
        /// 읽은 바이트 수
        bytes: usize,
        /// 처리한 완성 라인 수
        lines: usize,
    },
}

/// 모니터 상태의 시점 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
    /// 모니터 이름
    pub name: String,
    /// 현재 파일 경로
    pub filename: PathBuf,
    /// 알려진 카운터 값 (이름순)
    pub counters: BTreeMap<String, u64>,
    /// 알려진 스토어 내용 (이름순)
    pub stores: BTreeMap<String, Vec<String>>,
}

/// 잠금으로 보호되는 모니터 상태
#[derive(Debug)]
struct MonitorState {
    tail: Tail,
    rules: Vec<Rule>,
    counters: BTreeMap<String, u64>,
    stores: BTreeMap<String, Vec<String>>,
}

impl MonitorState {
    /// 라인 하나에 규칙을 순서대로 적용하고 매칭된 규칙 수를 반환합니다.
    fn line_read(&mut self, monitor: &str, line: &str) -> usize {
        let mut matched = 0;

        for rule in &self.rules {
            let Some(hit) = rule.evaluate(line) else {
                continue;
            };
            matched += 1;
            debug!(monitor, pattern = rule.pattern(), line = %hit.line, "rule matched");

            for effect in hit.effects {
                match effect {
                    Effect::IncrementCounter(name) => {
                        *self.counters.entry(name.clone()).or_insert(0) += 1;
                    }
                    Effect::AppendStore(name) => {
                        self.stores
                            .entry(name.clone())
                            .or_default()
                            .push(hit.line.clone());
                    }
                }
            }

            if hit.stop {
                break;
            }
        }

        matched
    }

    /// 증가되었거나 현재 규칙이 대상으로 삼는 카운터 이름
    fn known_counters(&self) -> BTreeSet<&str> {
        self.counters
            .keys()
            .map(String::as_str)
            .chain(self.rules.iter().flat_map(|r| r.counters().iter().map(String::as_str)))
            .collect()
    }

    /// 추가되었거나 현재 규칙이 대상으로 삼는 스토어 이름
    fn known_stores(&self) -> BTreeSet<&str> {
        self.stores
            .keys()
            .map(String::as_str)
            .chain(self.rules.iter().flat_map(|r| r.stores().iter().map(String::as_str)))
            .collect()
    }

    fn counter(&self, name: &str) -> Result<u64, MonitorError> {
        if let Some(value) = self.counters.get(name) {
            return Ok(*value);
        }
        if self.rules.iter().any(|r| r.counters().iter().any(|c| c == name)) {
            return Ok(0);
        }
        Err(MonitorError::not_found(LookupKind::Counter, name))
    }

    fn store(&self, name: &str) -> Result<Vec<String>, MonitorError> {
        if let Some(lines) = self.stores.get(name) {
            return Ok(lines.clone());
        }
        if self.rules.iter().any(|r| r.stores().iter().any(|s| s == name)) {
            return Ok(Vec::new());
        }
        Err(MonitorError::not_found(LookupKind::Store, name))
    }
}

/// 파일 하나를 테일링하며 규칙으로 라인을 분류하는 모니터
///
/// 스케줄러와 조회 서버가 `Arc<FileMonitor>`로 공유합니다.
#[derive(Debug)]
pub struct FileMonitor {
    name: String,
    block_size: usize,
    start_at: StartPosition,
    state: Mutex<MonitorState>,
}

impl FileMonitor {
    /// 규칙 없는 모니터를 생성합니다. 파일은 첫 사이클에서 열립니다.
    ///
    /// # Errors
    /// 이름이 비었거나 `/`를 포함하면, 또는 `block_size`가 0이면 [`MonitorError::Config`]
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<PathBuf>,
        block_size: usize,
        start_at: StartPosition,
    ) -> Result<Self, MonitorError> {
        let name = name.into();
        if name.trim().is_empty() || name.contains('/') {
            return Err(MonitorError::Config {
                field: "name".to_owned(),
                reason: format!("invalid monitor name '{name}'"),
            });
        }
        if block_size == 0 {
            return Err(MonitorError::Config {
                field: "block_size".to_owned(),
                reason: "block size must be greater than 0".to_owned(),
            });
        }

        Ok(Self {
            name,
            block_size,
            start_at,
            state: Mutex::new(MonitorState {
                tail: Tail::new(filename, block_size, start_at),
                rules: Vec::new(),
                counters: BTreeMap::new(),
                stores: BTreeMap::new(),
            }),
        })
    }

    /// 설정 항목에서 모니터를 생성합니다.
    ///
    /// `block_size`는 항목에 값이 없을 때 쓰는 기본값입니다.
    ///
    /// # Errors
    /// 규칙 하나라도 컴파일에 실패하면 모니터를 만들지 않고
    /// [`MonitorError::InvalidPattern`]을 반환합니다.
    pub fn from_config(config: &MonitorConfig, block_size: usize) -> Result<Self, MonitorError> {
        let rules = config
            .rules
            .iter()
            .map(Rule::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut monitor = Self::new(
            config.name.clone(),
            &config.filename,
            config.block_size.unwrap_or(block_size),
            config.start_at,
        )?;
        monitor.state.get_mut().rules = rules;
        Ok(monitor)
    }

    /// 모니터 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 사이클당 읽기 크기
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 새 핸들의 읽기 시작 위치
    pub fn start_at(&self) -> StartPosition {
        self.start_at
    }

    /// 읽기 사이클 하나를 수행합니다.
    ///
    /// 에러를 호출자에게 전파하지 않습니다. 열기/읽기 실패는 로그와 메트릭으로
    /// 보고되고 [`ReadOutcome::Unavailable`]로 돌아옵니다.
    pub async fn read(&self) -> ReadOutcome {
        let started = Instant::now();
        let mut state = self.state.lock().await;

        let outcome = match state.tail.poll().await {
            Err(err) => {
                warn!(monitor = %self.name, error = %err, "unable to read file, will retry");
                metrics::counter!(m::MONITOR_READ_ERRORS_TOTAL, m::LABEL_MONITOR => self.name.clone())
                    .increment(1);
                ReadOutcome::Unavailable(err)
            }
            Ok(batch) if batch.bytes == 0 => ReadOutcome::Idle,
            Ok(batch) => {
                let mut matched = 0;
                for line in &batch.lines {
                    matched += state.line_read(&self.name, line);
                }

                metrics::counter!(m::MONITOR_BYTES_READ_TOTAL, m::LABEL_MONITOR => self.name.clone())
                    .increment(batch.bytes as u64);
                metrics::counter!(m::MONITOR_LINES_READ_TOTAL, m::LABEL_MONITOR => self.name.clone())
                    .increment(batch.lines.len() as u64);
                metrics::counter!(m::MONITOR_RULE_MATCHES_TOTAL, m::LABEL_MONITOR => self.name.clone())
                    .increment(matched as u64);

                ReadOutcome::Read {
                    bytes: batch.bytes,
                    lines: batch.lines.len(),
                }
            }
        };

        drop(state);
        metrics::histogram!(m::MONITOR_CYCLE_DURATION_SECONDS, m::LABEL_MONITOR => self.name.clone())
            .record(started.elapsed().as_secs_f64());

        outcome
    }

    /// 라인 하나를 규칙에 통과시키고 매칭된 규칙 수를 반환합니다.
    ///
    /// 파일을 거치지 않고 라인을 주입할 때 사용합니다.
    pub async fn line_read(&self, line: &str) -> usize {
        self.state.lock().await.line_read(&self.name, line)
    }

    /// 현재 파일 경로
    pub async fn filename(&self) -> PathBuf {
        self.state.lock().await.tail.path().to_path_buf()
    }

    /// 파일 핸들 상태
    pub async fn tail_state(&self) -> TailState {
        self.state.lock().await.tail.state()
    }

    /// 대상 파일을 바꿉니다.
    ///
    /// 열린 핸들을 닫고 부분 라인 버퍼를 비웁니다. 카운터와 스토어는 유지됩니다.
    pub async fn set_filename(&self, filename: impl Into<PathBuf>) {
        let filename = filename.into();
        let mut state = self.state.lock().await;
        debug!(
            monitor = %self.name,
            from = %state.tail.path().display(),
            to = %filename.display(),
            "changing monitored file"
        );
        state.tail.set_path(filename);
    }

    /// 핸들을 닫고 부분 라인 버퍼를 비웁니다.
    ///
    /// 다음 사이클이 다시 열기를 시도하므로, 영구 정지는 스케줄 취소와 함께 씁니다.
    pub async fn close(&self) {
        self.state.lock().await.tail.close();
    }

    /// 규칙을 목록 끝에 추가합니다.
    pub async fn push_rule(&self, rule: Rule) {
        self.state.lock().await.rules.push(rule);
    }

    /// 규칙을 `index` 위치에 삽입합니다.
    ///
    /// # Errors
    /// `index`가 규칙 수보다 크면 [`MonitorError::RuleIndex`]
    pub async fn insert_rule(&self, index: usize, rule: Rule) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        let len = state.rules.len();
        if index > len {
            return Err(MonitorError::RuleIndex { index, len });
        }
        state.rules.insert(index, rule);
        Ok(())
    }

    /// `index` 위치의 규칙을 제거해 반환합니다.
    ///
    /// # Errors
    /// `index`가 범위를 벗어나면 [`MonitorError::RuleIndex`]
    pub async fn remove_rule(&self, index: usize) -> Result<Rule, MonitorError> {
        let mut state = self.state.lock().await;
        let len = state.rules.len();
        if index >= len {
            return Err(MonitorError::RuleIndex { index, len });
        }
        Ok(state.rules.remove(index))
    }

    /// 규칙 목록 전체를 교체합니다.
    pub async fn replace_rules(&self, rules: Vec<Rule>) {
        self.state.lock().await.rules = rules;
    }

    /// 현재 규칙 목록을 설정 형태로 반환합니다.
    pub async fn rules(&self) -> Vec<RuleConfig> {
        self.state
            .lock()
            .await
            .rules
            .iter()
            .map(Rule::to_config)
            .collect()
    }

    /// 알려진 카운터 이름 (정렬됨)
    pub async fn counter_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.known_counters().into_iter().map(str::to_owned).collect()
    }

    /// 알려진 스토어 이름 (정렬됨)
    pub async fn store_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.known_stores().into_iter().map(str::to_owned).collect()
    }

    /// 카운터 값을 조회합니다.
    ///
    /// # Errors
    /// 증가된 적도 없고 어떤 규칙의 대상도 아니면 [`MonitorError::NotFound`]
    pub async fn counter(&self, name: &str) -> Result<u64, MonitorError> {
        self.state.lock().await.counter(name)
    }

    /// 스토어 내용을 삽입 순서대로 조회합니다.
    ///
    /// # Errors
    /// 추가된 적도 없고 어떤 규칙의 대상도 아니면 [`MonitorError::NotFound`]
    pub async fn store(&self, name: &str) -> Result<Vec<String>, MonitorError> {
        self.state.lock().await.store(name)
    }

    /// 한 번의 잠금으로 전체 상태를 복사합니다.
    pub async fn snapshot(&self) -> MonitorSnapshot {
        let state = self.state.lock().await;

        let counters = state
            .known_counters()
            .into_iter()
            .map(|name| (name.to_owned(), state.counters.get(name).copied().unwrap_or(0)))
            .collect();
        let stores = state
            .known_stores()
            .into_iter()
            .map(|name| {
                let lines = state.stores.get(name).cloned().unwrap_or_default();
                (name.to_owned(), lines)
            })
            .collect();

        MonitorSnapshot {
            name: self.name.clone(),
            filename: state.tail.path().to_path_buf(),
            counters,
            stores,
        }
    }
}
