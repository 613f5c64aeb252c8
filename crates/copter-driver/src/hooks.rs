//! 融合线程回调
//!
//! 回调在融合线程内同步执行，耗时直接拖慢下一次采集交付
//! （汇总包通道没有缓冲），实现应尽量轻量。

use crate::sample::SummarizedSample;
use copter_ahrs::Orientation;
use copter_protocol::RemoteCommand;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// 融合事件回调
pub trait FusionObserver: Send + Sync {
    /// 滤波器成功更新后调用
    fn on_orientation(&self, orientation: &Orientation, sample: &SummarizedSample) {
        let _ = (orientation, sample);
    }

    /// 收到遥控命令时调用
    fn on_command(&self, command: &RemoteCommand) {
        let _ = command;
    }
}

/// 回调列表
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn FusionObserver>>,
}

impl ObserverSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: Arc<dyn FusionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify_orientation(&self, orientation: &Orientation, sample: &SummarizedSample) {
        for observer in &self.observers {
            observer.on_orientation(orientation, sample);
        }
    }

    pub fn notify_command(&self, command: &RemoteCommand) {
        for observer in &self.observers {
            observer.on_command(command);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("count", &self.observers.len())
            .finish()
    }
}

/// 控制台输出：按固定间隔打印姿态（度），每条命令到达时打印
#[derive(Debug)]
pub struct ConsoleReporter {
    interval: Duration,
    start: Instant,
    /// 上次打印距 `start` 的纳秒数，`u64::MAX` 表示尚未打印
    last_report_ns: AtomicU64,
    reports: AtomicU64,
}

impl ConsoleReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            start: Instant::now(),
            last_report_ns: AtomicU64::new(u64::MAX),
            reports: AtomicU64::new(0),
        }
    }

    /// 已打印的姿态行数
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    fn due(&self, now: Instant) -> bool {
        let now_ns = now.saturating_duration_since(self.start).as_nanos() as u64;
        let last = self.last_report_ns.load(Ordering::Relaxed);
        if last != u64::MAX && now_ns.saturating_sub(last) < self.interval.as_nanos() as u64 {
            return false;
        }
        self.last_report_ns.store(now_ns, Ordering::Relaxed);
        true
    }
}

impl FusionObserver for ConsoleReporter {
    fn on_orientation(&self, orientation: &Orientation, sample: &SummarizedSample) {
        if self.due(sample.timestamp) {
            let n = self.reports.fetch_add(1, Ordering::Relaxed) + 1;
            info!("{} {}", n, orientation);
        }
    }

    fn on_command(&self, command: &RemoteCommand) {
        info!(
            "CMD({}, {}, {}, {}, {}, {})",
            command.yaw, command.pitch, command.roll, command.throttle, command.aux1, command.aux2
        );
    }
}
