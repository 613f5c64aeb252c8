//! 流水线运行指标
//!
//! 原子计数器，任意线程可随时读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 流水线实时指标
///
/// 采集线程、命令线程、融合线程各自累加自己的计数器，
/// 外部通过 [`PipelineMetrics::snapshot`] 一次性读取。
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// 采集循环迭代次数
    pub acquisition_ticks: AtomicU64,

    /// 成功交给融合线程的汇总包
    pub packages_published: AtomicU64,

    /// 因陀螺仪或加速度计没有累积样本而丢弃的汇总包
    pub packages_dropped: AtomicU64,

    /// 磁力计读取失败次数（沿用上一次读数）
    pub mag_read_failures: AtomicU64,

    /// 滤波器成功更新次数
    pub filter_updates: AtomicU64,

    /// 滤波器拒绝的更新（时间间隔非正或输入非有限值）
    pub filter_rejected: AtomicU64,

    /// 收到并交付的遥控命令
    pub commands_received: AtomicU64,

    /// 接受的命令连接
    pub connections_accepted: AtomicU64,

    /// 关闭的命令连接（对端断开或读取错误）
    pub connections_closed: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            acquisition_ticks: self.acquisition_ticks.load(Ordering::Relaxed),
            packages_published: self.packages_published.load(Ordering::Relaxed),
            packages_dropped: self.packages_dropped.load(Ordering::Relaxed),
            mag_read_failures: self.mag_read_failures.load(Ordering::Relaxed),
            filter_updates: self.filter_updates.load(Ordering::Relaxed),
            filter_rejected: self.filter_rejected.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.acquisition_ticks.store(0, Ordering::Relaxed);
        self.packages_published.store(0, Ordering::Relaxed);
        self.packages_dropped.store(0, Ordering::Relaxed);
        self.mag_read_failures.store(0, Ordering::Relaxed);
        self.filter_updates.store(0, Ordering::Relaxed);
        self.filter_rejected.store(0, Ordering::Relaxed);
        self.commands_received.store(0, Ordering::Relaxed);
        self.connections_accepted.store(0, Ordering::Relaxed);
        self.connections_closed.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineMetricsSnapshot {
    pub acquisition_ticks: u64,
    pub packages_published: u64,
    pub packages_dropped: u64,
    pub mag_read_failures: u64,
    pub filter_updates: u64,
    pub filter_rejected: u64,
    pub commands_received: u64,
    pub connections_accepted: u64,
    pub connections_closed: u64,
}

impl PipelineMetricsSnapshot {
    /// 汇总包丢弃率（百分比），没有任何汇总包时为 0
    pub fn drop_rate(&self) -> f64 {
        let total = self.packages_published + self.packages_dropped;
        if total == 0 {
            return 0.0;
        }
        (self.packages_dropped as f64 / total as f64) * 100.0
    }

    /// 平均每个汇总包包含的采集迭代次数
    pub fn ticks_per_package(&self) -> f64 {
        if self.packages_published == 0 {
            return 0.0;
        }
        self.acquisition_ticks as f64 / self.packages_published as f64
    }
}
