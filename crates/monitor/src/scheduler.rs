//! 폴링 스케줄러
//!
//! 모니터마다 하나의 tokio 태스크가 고정 주기로 [`FileMonitor::read`]를 호출합니다.
//! 등록 직후 한 번 즉시 실행하고, 이후 주기마다 실행합니다.
//!
//! 한 모니터의 사이클은 겹치지 않습니다. 태스크는 사이클을 끝까지 기다린 뒤에야
//! 다음 틱을 기다리며, 긴 사이클 중에 지난 틱은 완료 직후로 미뤄집니다
//! ([`MissedTickBehavior::Delay`]).
//!
//! 취소는 틱을 기다리는 지점에서만 관찰되므로 진행 중인 사이클은 중단되지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::MonitorError;
use crate::monitor::FileMonitor;

/// 모니터 폴링 스케줄러
///
/// 스케줄러가 만든 모든 스케줄은 내부 루트 토큰의 자식 토큰을 가지므로
/// [`cancel_all`](Self::cancel_all)로 한 번에 멈출 수 있습니다.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    root: CancellationToken,
}

impl Scheduler {
    /// 주어진 주기로 스케줄러를 생성합니다.
    ///
    /// # Errors
    /// 주기가 0이면 [`MonitorError::Config`]
    pub fn new(interval: Duration) -> Result<Self, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::Config {
                field: "poll_interval".to_owned(),
                reason: "interval must be greater than 0".to_owned(),
            });
        }
        Ok(Self {
            interval,
            root: CancellationToken::new(),
        })
    }

    /// 엔진 설정에서 스케줄러를 생성합니다.
    pub fn from_config(config: &EngineConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        Self::new(config.poll_interval())
    }

    /// 폴링 주기
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 모니터의 폴링 태스크를 시작합니다.
    pub fn spawn(&self, monitor: Arc<FileMonitor>) -> ScheduleHandle {
        let cancel = self.root.child_token();
        let task = tokio::spawn(run_schedule(monitor, self.interval, cancel.clone()));
        ScheduleHandle {
            cancel,
            task: Some(task),
        }
    }

    /// 이 스케줄러가 시작한 모든 스케줄을 취소합니다.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}

async fn run_schedule(monitor: Arc<FileMonitor>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        monitor = monitor.name(),
        interval_ms = period.as_millis() as u64,
        "monitor scheduled"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // 사이클은 취소와 경쟁하지 않음
        monitor.read().await;
    }

    debug!(monitor = monitor.name(), "monitor schedule stopped");
}

/// 실행 중인 스케줄 핸들
///
/// 핸들을 버리면 스케줄도 취소됩니다.
#[derive(Debug)]
pub struct ScheduleHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// 이후의 틱을 멈춥니다. 진행 중인 사이클은 끝까지 실행됩니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 취소 여부
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 태스크 종료 여부
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// 스케줄을 취소하고 진행 중인 사이클이 끝날 때까지 기다립니다.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "monitor schedule task failed");
            }
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
