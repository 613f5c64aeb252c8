//! Copter 运行时（对外 API）
//!
//! 持有采集、命令、融合三个线程的句柄，以及它们共享的状态与指标。

use crate::error::DriverError;
use crate::hooks::ObserverSet;
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use crate::pipeline::{PipelineConfig, acquisition_loop, command_loop, fusion_loop, wake_listener};
use crate::sensors::SensorSet;
use crate::state::{AttitudeState, CopterState};
use copter_ahrs::{MahonyFilter, Orientation};
use copter_bus::{Bus, BusMetricsSnapshot};
use copter_protocol::RemoteCommand;
use crossbeam_channel::{Sender, bounded};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// 关闭时等待每个线程退出的上限
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 join
///
/// 由一个看守线程执行真正的 join，调用方阻塞在 channel 上等待结果。
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(joined) => joined.map(|_| ()),
            // 超时后看守线程继续等待，进程退出时回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 运行中的姿态估计流水线
///
/// 由 [`CopterBuilder`](crate::CopterBuilder) 创建。Drop 时请求所有线程退出并等待。
pub struct Copter {
    bus: Arc<Bus>,
    state: Arc<CopterState>,
    metrics: Arc<PipelineMetrics>,
    is_running: Arc<AtomicBool>,
    /// 只用于关闭：drop 后融合线程的 select 立即返回
    shutdown_tx: Option<Sender<()>>,
    command_addr: Option<SocketAddr>,
    acquisition_thread: Option<JoinHandle<()>>,
    command_thread: Option<JoinHandle<()>>,
    fusion_thread: Option<JoinHandle<()>>,
}

impl Copter {
    /// 启动三个线程
    ///
    /// 命令端口绑定失败不影响姿态估计：命令通道直接关闭，融合线程只处理传感器数据。
    pub(crate) fn start(
        bus: Arc<Bus>,
        sensors: SensorSet,
        filter: MahonyFilter,
        config: PipelineConfig,
        listen_addr: SocketAddr,
        observers: ObserverSet,
    ) -> Result<Self, DriverError> {
        let (sensor_tx, sensor_rx) = bounded(0);
        let (command_tx, command_rx) = bounded::<RemoteCommand>(0);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let mut copter = Self {
            bus,
            state: Arc::new(CopterState::new()),
            metrics: Arc::new(PipelineMetrics::new()),
            is_running: Arc::new(AtomicBool::new(true)),
            shutdown_tx: Some(shutdown_tx),
            command_addr: None,
            acquisition_thread: None,
            command_thread: None,
            fusion_thread: None,
        };

        let state = copter.state.clone();
        let metrics = copter.metrics.clone();
        copter.fusion_thread = Some(thread::Builder::new().name("copter-fusion".into()).spawn(
            move || {
                fusion_loop(
                    sensor_rx,
                    command_rx,
                    shutdown_rx,
                    filter,
                    state,
                    observers,
                    metrics,
                )
            },
        )?);

        match TcpListener::bind(listen_addr) {
            Ok(listener) => {
                copter.command_addr = listener.local_addr().ok();
                let is_running = copter.is_running.clone();
                let metrics = copter.metrics.clone();
                let layout = config.layout;
                copter.command_thread =
                    Some(thread::Builder::new().name("copter-command".into()).spawn(
                        move || command_loop(listener, command_tx, layout, is_running, metrics),
                    )?);
            },
            Err(e) => {
                error!(
                    "Failed to bind command listener on {}: {}, remote commands disabled",
                    listen_addr, e
                );
                drop(command_tx);
            },
        }

        let is_running = copter.is_running.clone();
        let metrics = copter.metrics.clone();
        copter.acquisition_thread = Some(
            thread::Builder::new()
                .name("copter-acquisition".into())
                .spawn(move || acquisition_loop(sensors, sensor_tx, config, is_running, metrics))?,
        );

        Ok(copter)
    }

    /// 最新姿态（未更新过时为全零）
    pub fn orientation(&self) -> Orientation {
        self.state.orientation()
    }

    pub fn attitude(&self) -> AttitudeState {
        self.state.attitude()
    }

    /// 最近一次遥控命令
    pub fn last_command(&self) -> Option<RemoteCommand> {
        self.state.last_command().map(|c| c.command)
    }

    pub fn state(&self) -> &Arc<CopterState> {
        &self.state
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn bus_metrics(&self) -> BusMetricsSnapshot {
        self.bus.metrics()
    }

    /// 命令监听的实际地址，绑定失败时为 `None`
    pub fn command_addr(&self) -> Option<SocketAddr> {
        self.command_addr
    }

    /// 融合线程是否仍在运行
    pub fn is_healthy(&self) -> bool {
        self.fusion_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 阻塞直到融合线程退出，然后关闭其余线程
    ///
    /// 没有请求关闭时，融合线程只会因汇总包通道关闭（采集线程退出）而结束，
    /// 此时返回 [`DriverError::ChannelClosed`]。
    pub fn wait(mut self) -> Result<(), DriverError> {
        let joined = match self.fusion_thread.take() {
            Some(handle) => match handle.join() {
                Ok(()) => Err(DriverError::ChannelClosed),
                Err(_) => Err(DriverError::ThreadPanicked("fusion".into())),
            },
            None => Ok(()),
        };
        let stopped = self.stop();
        joined.and(stopped)
    }

    /// 请求所有线程退出并等待
    pub fn shutdown(mut self) -> Result<(), DriverError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        // Release: 关闭前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);
        self.shutdown_tx.take();
        if self.command_thread.is_some()
            && let Some(addr) = self.command_addr
        {
            wake_listener(addr);
        }

        let mut result = Ok(());
        for (name, handle) in [
            ("fusion", self.fusion_thread.take()),
            ("acquisition", self.acquisition_thread.take()),
            ("command", self.command_thread.take()),
        ] {
            if let Some(handle) = handle
                && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
            {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, JOIN_TIMEOUT
                );
                if result.is_ok() {
                    result = Err(DriverError::ThreadPanicked(name.into()));
                }
            }
        }
        if result.is_ok() {
            info!("Pipeline stopped");
        }
        result
    }
}

impl Drop for Copter {
    fn drop(&mut self) {
        if self.fusion_thread.is_some()
            || self.acquisition_thread.is_some()
            || self.command_thread.is_some()
        {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for Copter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Copter")
            .field("bus", &self.bus.number())
            .field("command_addr", &self.command_addr)
            .field("healthy", &self.is_healthy())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
