//! 对外共享的最新状态
//!
//! 融合线程是唯一的写者，任意线程可无锁读取最新快照。

use arc_swap::{ArcSwap, ArcSwapOption};
use copter_ahrs::Orientation;
use copter_protocol::RemoteCommand;
use std::sync::Arc;
use std::time::Instant;

/// 最近一次滤波器输出
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeState {
    pub orientation: Orientation,
    /// 对应汇总包的打包时刻，尚未更新过时为 `None`
    pub timestamp: Option<Instant>,
    /// 对应汇总包内的采集迭代次数
    pub sample_count: u32,
    /// 累计更新次数
    pub updates: u64,
}

/// 最近一次遥控命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandState {
    pub command: RemoteCommand,
    pub received_at: Instant,
}

#[derive(Debug)]
pub struct CopterState {
    attitude: ArcSwap<AttitudeState>,
    command: ArcSwapOption<CommandState>,
}

impl CopterState {
    pub fn new() -> Self {
        Self {
            attitude: ArcSwap::from_pointee(AttitudeState::default()),
            command: ArcSwapOption::empty(),
        }
    }

    pub fn attitude(&self) -> AttitudeState {
        *self.attitude.load().as_ref()
    }

    pub fn orientation(&self) -> Orientation {
        self.attitude.load().orientation
    }

    pub fn last_command(&self) -> Option<CommandState> {
        self.command.load().as_deref().copied()
    }

    pub(crate) fn publish_attitude(
        &self,
        orientation: Orientation,
        timestamp: Instant,
        sample_count: u32,
    ) {
        let updates = self.attitude.load().updates + 1;
        self.attitude.store(Arc::new(AttitudeState {
            orientation,
            timestamp: Some(timestamp),
            sample_count,
            updates,
        }));
    }

    pub(crate) fn publish_command(&self, command: RemoteCommand, received_at: Instant) {
        self.command.store(Some(Arc::new(CommandState {
            command,
            received_at,
        })));
    }
}

impl Default for CopterState {
    fn default() -> Self {
        Self::new()
    }
}
