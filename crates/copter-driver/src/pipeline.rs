//! 流水线线程主循环
//!
//! - [`acquisition_loop`]：采集线程。每次迭代先采陀螺仪、再采加速度计，
//!   每次采样后检查是否到达汇总周期，到达则打包交给融合线程。
//!   磁力计每隔 `mag_every` 个汇总包才重新读取一次。
//! - [`command_loop`]：命令线程。接受 TCP 连接，按 12 字节一帧解码遥控命令。
//! - [`fusion_loop`]：融合线程。独占滤波器，同时等待汇总包和遥控命令，
//!   两个来源之间没有优先级。
//!
//! 两条通道都是零容量（rendezvous）通道：融合线程还没取走上一个汇总包时，
//! 采集线程阻塞在发送上，不会堆积过期的姿态输入。

use crate::hooks::ObserverSet;
use crate::metrics::PipelineMetrics;
use crate::sample::SummarizedSample;
use crate::sensors::SensorSet;
use crate::state::CopterState;
use copter_ahrs::MahonyFilter;
use copter_protocol::{COMMAND_PACKET_LEN, CommandLayout, RemoteCommand};
use copter_sensors::SensorError;
use crossbeam_channel::{Receiver, Sender, select};
use nalgebra::Vector3;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 命令连接上两次检查运行标志之间的最长阻塞时间
///
/// 只用于响应关闭请求，超时不会断开连接，也不会丢弃已读取的半帧。
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pipeline 运行时参数
///
/// # Example
///
/// ```
/// # use copter_driver::PipelineConfig;
/// # use std::time::Duration;
/// let config = PipelineConfig::default();
/// assert_eq!(config.period, Duration::from_micros(19_800));
/// assert_eq!(config.mag_every, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 汇总周期
    pub period: Duration,
    /// 每隔多少个汇总包重新读取磁力计
    pub mag_every: u32,
    /// 两次采集迭代之间的休眠，零表示不休眠
    pub measure_interval: Duration,
    /// 控制台姿态输出间隔，零表示关闭
    pub report_interval: Duration,
    /// 遥控命令字段布局
    pub layout: CommandLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1) / 50 - Duration::from_micros(200),
            mag_every: 5,
            measure_interval: Duration::ZERO,
            report_interval: Duration::from_secs(1),
            layout: CommandLayout::Declared,
        }
    }
}

/// 汇总周期与磁力计节奏的计时状态
#[derive(Debug, Clone)]
struct Cadence {
    period: Duration,
    mag_every: u32,
    last_package: Instant,
    ticks: u32,
    packages_since_mag: u32,
}

impl Cadence {
    fn new(period: Duration, mag_every: u32, start: Instant) -> Self {
        Self {
            period,
            mag_every: mag_every.max(1),
            last_package: start,
            ticks: 0,
            packages_since_mag: 0,
        }
    }

    fn tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_package) >= self.period
    }

    /// 记录一次打包（无论成功还是丢弃），返回本周期的迭代次数
    fn packaged(&mut self, now: Instant) -> u32 {
        self.last_package = now;
        self.packages_since_mag += 1;
        std::mem::take(&mut self.ticks)
    }

    /// 是否该重新读取磁力计（为真时计数清零）
    fn mag_due(&mut self) -> bool {
        if self.packages_since_mag >= self.mag_every {
            self.packages_since_mag = 0;
            true
        } else {
            false
        }
    }
}

/// 融合线程已退出
struct Disconnected;

/// 采集线程持有的全部状态
struct Acquisition {
    sensors: SensorSet,
    cadence: Cadence,
    mag: Vector3<f32>,
    tx: Sender<SummarizedSample>,
    metrics: Arc<PipelineMetrics>,
}

impl Acquisition {
    /// 每次采样后调用：周期已到则打包并交付
    fn check_period(&mut self) -> Result<(), Disconnected> {
        let now = Instant::now();
        if !self.cadence.due(now) {
            return Ok(());
        }

        let sample_count = self.cadence.packaged(now);
        match self.package(now, sample_count) {
            Ok(sample) => {
                self.tx.send(sample).map_err(|_| Disconnected)?;
                PipelineMetrics::incr(&self.metrics.packages_published);
            },
            Err(e) => {
                PipelineMetrics::incr(&self.metrics.packages_dropped);
                warn!("Package dropped: {}", e);
            },
        }

        if self.cadence.mag_due() {
            self.refresh_mag();
        }
        Ok(())
    }

    fn package(&mut self, now: Instant, sample_count: u32) -> Result<SummarizedSample, SensorError> {
        let gyro = self.sensors.gyro.evaluate()?;
        let accel = self.sensors.accel.evaluate()?;
        Ok(SummarizedSample {
            timestamp: now,
            gyro,
            accel,
            mag: self.mag,
            sample_count,
        })
    }

    /// 读取失败时沿用上一次读数
    fn refresh_mag(&mut self) {
        match self.sensors.mag.read_xyz() {
            Ok(mag) => self.mag = mag,
            Err(e) => {
                PipelineMetrics::incr(&self.metrics.mag_read_failures);
                warn!("Magnetometer read failed, keeping previous reading: {}", e);
            },
        }
    }
}

/// 采集线程主循环
///
/// 运行标志被清除，或融合线程退出（发送失败）时返回。
pub fn acquisition_loop(
    sensors: SensorSet,
    tx: Sender<SummarizedSample>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Acquisition thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set acquisition thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let mut acquisition = Acquisition {
        sensors,
        cadence: Cadence::new(config.period, config.mag_every, Instant::now()),
        mag: Vector3::zeros(),
        tx,
        metrics,
    };
    acquisition.refresh_mag();
    debug!(
        "Acquisition started: period {:?}, magnetometer every {} packages",
        config.period, config.mag_every
    );

    loop {
        // Acquire: 看到 false 时，关闭方之前的写入也一定可见
        if !is_running.load(Ordering::Acquire) {
            trace!("Acquisition thread: is_running flag is false, exiting");
            break;
        }

        acquisition.cadence.tick();
        PipelineMetrics::incr(&acquisition.metrics.acquisition_ticks);

        acquisition.sensors.gyro.measure();
        if acquisition.check_period().is_err() {
            info!("Fusion thread gone, acquisition thread exiting");
            break;
        }

        acquisition.sensors.accel.measure();
        if acquisition.check_period().is_err() {
            info!("Fusion thread gone, acquisition thread exiting");
            break;
        }

        if !config.measure_interval.is_zero() {
            spin_sleep::sleep(config.measure_interval);
        }
    }
}

/// 单个命令连接的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// 对端关闭或读取出错，回到 accept
    Closed,
    /// 融合线程已退出
    ChannelClosed,
    /// 运行标志被清除
    Shutdown,
}

/// 命令线程主循环
///
/// 一次只服务一个连接。连接断开或读取出错后重新 accept；
/// accept 出错时退出，命令通道随之关闭。
pub fn command_loop(
    listener: TcpListener,
    tx: Sender<RemoteCommand>,
    layout: CommandLayout,
    is_running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Listening for commands on {} ({:?} layout)", addr, layout),
        Err(e) => warn!("Command listener address unavailable: {}", e),
    }

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Command listener accept failed, closing command channel: {}", e);
                break;
            },
        };

        if !is_running.load(Ordering::Acquire) {
            trace!("Command thread: is_running flag is false, exiting");
            break;
        }

        PipelineMetrics::incr(&metrics.connections_accepted);
        info!("Command connection from {}", peer);

        match serve_connection(stream, &tx, layout, &is_running, &metrics) {
            ConnectionEnd::Closed => {
                PipelineMetrics::incr(&metrics.connections_closed);
                info!("Command connection from {} closed", peer);
            },
            ConnectionEnd::ChannelClosed => {
                info!("Fusion thread gone, command thread exiting");
                break;
            },
            ConnectionEnd::Shutdown => {
                trace!("Command thread: is_running flag is false, exiting");
                break;
            },
        }
    }
}

/// 读取一个连接上的命令流
///
/// 短读不丢弃：已读到的字节留在缓冲区，继续读满 12 字节。
fn serve_connection(
    mut stream: TcpStream,
    tx: &Sender<RemoteCommand>,
    layout: CommandLayout,
    is_running: &AtomicBool,
    metrics: &PipelineMetrics,
) -> ConnectionEnd {
    if let Err(e) = stream.set_read_timeout(Some(COMMAND_POLL_INTERVAL)) {
        warn!("Failed to set command read timeout: {}", e);
    }

    let mut packet = [0u8; COMMAND_PACKET_LEN];
    let mut filled = 0;

    loop {
        if !is_running.load(Ordering::Acquire) {
            return ConnectionEnd::Shutdown;
        }

        match stream.read(&mut packet[filled..]) {
            Ok(0) => return ConnectionEnd::Closed,
            Ok(n) => {
                filled += n;
                if filled < COMMAND_PACKET_LEN {
                    trace!("Partial command packet: {} of {} bytes", filled, COMMAND_PACKET_LEN);
                    continue;
                }
                filled = 0;

                let command = RemoteCommand::decode(&packet, layout);
                if tx.send(command).is_err() {
                    return ConnectionEnd::ChannelClosed;
                }
                PipelineMetrics::incr(&metrics.commands_received);
            },
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {},
            Err(e) => {
                warn!("Command connection read failed: {}", e);
                return ConnectionEnd::Closed;
            },
        }
    }
}

/// 唤醒阻塞在 accept 上的命令线程
pub(crate) fn wake_listener(addr: SocketAddr) {
    let mut target = addr;
    if target.ip().is_unspecified() {
        target.set_ip(match addr {
            SocketAddr::V4(_) => [127, 0, 0, 1].into(),
            SocketAddr::V6(_) => std::net::Ipv6Addr::LOCALHOST.into(),
        });
    }
    if let Err(e) = TcpStream::connect_timeout(&target, COMMAND_POLL_INTERVAL) {
        debug!("Command listener wake-up connect to {} failed: {}", target, e);
    }
}

enum FusionEvent {
    Sample(SummarizedSample),
    Command(RemoteCommand),
    SensorsClosed,
    CommandsClosed,
    Shutdown,
}

/// 融合线程主循环
///
/// 汇总包通道关闭或关闭信号通道断开时返回；
/// 命令通道关闭只停止命令处理，姿态估计继续。
pub fn fusion_loop(
    sensor_rx: Receiver<SummarizedSample>,
    command_rx: Receiver<RemoteCommand>,
    shutdown_rx: Receiver<()>,
    mut filter: MahonyFilter,
    state: Arc<CopterState>,
    observers: ObserverSet,
    metrics: Arc<PipelineMetrics>,
) {
    let mut command_rx = command_rx;

    loop {
        let event = select! {
            recv(sensor_rx) -> msg => msg.map_or(FusionEvent::SensorsClosed, FusionEvent::Sample),
            recv(command_rx) -> msg => msg.map_or(FusionEvent::CommandsClosed, FusionEvent::Command),
            recv(shutdown_rx) -> _ => FusionEvent::Shutdown,
        };

        match event {
            FusionEvent::Sample(sample) => {
                let gyro = sample.gyro.map(f32::to_radians);
                match filter.update(sample.timestamp, gyro, sample.accel, sample.mag) {
                    Ok(orientation) => {
                        PipelineMetrics::incr(&metrics.filter_updates);
                        state.publish_attitude(orientation, sample.timestamp, sample.sample_count);
                        observers.notify_orientation(&orientation, &sample);
                    },
                    Err(e) => {
                        PipelineMetrics::incr(&metrics.filter_rejected);
                        warn!("Filter update rejected: {}", e);
                    },
                }
            },
            FusionEvent::Command(command) => {
                state.publish_command(command, Instant::now());
                observers.notify_command(&command);
            },
            FusionEvent::CommandsClosed => {
                warn!("Command channel closed, continuing without remote commands");
                command_rx = crossbeam_channel::never();
            },
            FusionEvent::SensorsClosed => {
                info!("Sensor channel closed, fusion thread exiting");
                break;
            },
            FusionEvent::Shutdown => {
                trace!("Fusion thread: shutdown requested, exiting");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::hooks::FusionObserver;
    use approx::assert_relative_eq;
    use copter_ahrs::Orientation;
    use copter_bus::{Bus, MockTransport};
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn le(values: [i16; 3]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn be(values: [i16; 3]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn mock_sensors() -> (MockTransport, SensorSet) {
        let mock = MockTransport::new();
        mock.set_registers(0x6B, 0x28, &le([100, 200, 300]));
        mock.set_registers(0x19, 0x28, &le([160, -160, 16000]));
        mock.set_registers(0x1E, 0x03, &be([110, -400, 55]));
        let bus = Arc::new(Bus::new(1, Box::new(mock.clone())));
        let sensors = SensorSet::init(bus, &BusConfig::default()).unwrap();
        (mock, sensors)
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            period: Duration::from_millis(5),
            mag_every: 2,
            measure_interval: Duration::from_micros(200),
            ..Default::default()
        }
    }

    #[test]
    fn test_cadence_waits_for_period() {
        let start = Instant::now();
        let mut cadence = Cadence::new(Duration::from_millis(20), 5, start);
        assert!(!cadence.due(start));
        assert!(!cadence.due(start + Duration::from_millis(19)));
        assert!(cadence.due(start + Duration::from_millis(20)));

        cadence.tick();
        cadence.tick();
        cadence.tick();
        let now = start + Duration::from_millis(21);
        assert_eq!(cadence.packaged(now), 3);
        assert!(!cadence.due(now + Duration::from_millis(10)));
        assert_eq!(cadence.packaged(now), 0);
    }

    #[test]
    fn test_cadence_mag_every_fifth_package() {
        let start = Instant::now();
        let mut cadence = Cadence::new(Duration::from_millis(20), 5, start);
        let mut refreshes = Vec::new();
        for i in 1..=12 {
            cadence.packaged(start);
            if cadence.mag_due() {
                refreshes.push(i);
            }
        }
        assert_eq!(refreshes, vec![5, 10]);
    }

    #[test]
    fn test_acquisition_publishes_averaged_packages() {
        let (mock, sensors) = mock_sensors();
        // 初始读取返回一组值，之后的读取返回寄存器镜像
        mock.queue_read(0x1E, 0x03, &be([1, 2, 3]));

        let (tx, rx) = bounded(0);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::new());
        let handle = {
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::spawn(move || acquisition_loop(sensors, tx, fast_config(), is_running, metrics))
        };

        let samples: Vec<SummarizedSample> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        drop(rx);
        handle.join().unwrap();

        for sample in &samples {
            // X/Y 交换后 (200, 100, 300) × 0.00875
            assert_relative_eq!(sample.gyro.x, 1.75, epsilon = 1e-5);
            assert_relative_eq!(sample.gyro.y, 0.875, epsilon = 1e-5);
            assert_relative_eq!(sample.gyro.z, 2.625, epsilon = 1e-5);
            assert_relative_eq!(sample.accel.z, 16000.0 / 16.0 * 1e-3 * 9.80665, epsilon = 1e-4);
            assert!(sample.sample_count > 0);
        }
        assert!(
            samples
                .windows(2)
                .all(|pair| pair[1].timestamp - pair[0].timestamp >= Duration::from_millis(5))
        );

        // 先用初始读数，最多两个汇总包之后换成新读数（x, z, y 顺序）
        assert_relative_eq!(samples[0].mag.x, 100.0 / 1100.0, epsilon = 1e-6);
        let refreshed = samples.iter().position(|s| s.mag.x != samples[0].mag.x).unwrap();
        assert!(refreshed <= 2, "magnetometer refreshed at package {}", refreshed);
        assert_relative_eq!(samples[refreshed].mag.x, 110.0 * 100.0 / 1100.0, epsilon = 1e-5);

        let snapshot = metrics.snapshot();
        assert!(snapshot.packages_published >= 10);
        assert!(snapshot.acquisition_ticks >= snapshot.packages_published);
    }

    #[test]
    fn test_acquisition_drops_packages_without_accel_samples() {
        let (mock, sensors) = mock_sensors();
        mock.fail_address(0x19);

        let (tx, rx) = bounded::<SummarizedSample>(0);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::new());
        let handle = {
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::spawn(move || acquisition_loop(sensors, tx, fast_config(), is_running, metrics))
        };

        thread::sleep(Duration::from_millis(60));
        is_running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert!(rx.try_recv().is_err());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packages_published, 0);
        assert!(snapshot.packages_dropped > 0);
    }

    #[test]
    fn test_acquisition_keeps_last_mag_on_failure() {
        let (mock, sensors) = mock_sensors();
        let (tx, rx) = bounded(0);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::new());
        let handle = {
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::spawn(move || acquisition_loop(sensors, tx, fast_config(), is_running, metrics))
        };

        let first: SummarizedSample = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        mock.fail_address(0x1E);
        let later: Vec<SummarizedSample> = (0..6)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        drop(rx);
        handle.join().unwrap();

        assert_ne!(first.mag, Vector3::zeros());
        assert!(later.iter().all(|s| s.mag == first.mag));
        assert!(metrics.snapshot().mag_read_failures >= 1);
    }

    #[derive(Default)]
    struct Recorder {
        orientations: AtomicUsize,
        commands: AtomicUsize,
    }

    impl FusionObserver for Recorder {
        fn on_orientation(&self, _: &Orientation, _: &SummarizedSample) {
            self.orientations.fetch_add(1, Ordering::Relaxed);
        }

        fn on_command(&self, _: &RemoteCommand) {
            self.commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn level_sample(timestamp: Instant) -> SummarizedSample {
        SummarizedSample {
            timestamp,
            gyro: Vector3::zeros(),
            accel: Vector3::new(0.01, -0.01, 9.81),
            mag: Vector3::new(20.0, 0.5, -40.0),
            sample_count: 40,
        }
    }

    #[test]
    fn test_fusion_processes_samples_and_commands() {
        let (sensor_tx, sensor_rx) = bounded(0);
        let (command_tx, command_rx) = bounded(0);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let start = Instant::now();
        let state = Arc::new(CopterState::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let recorder = Arc::new(Recorder::default());
        let mut observers = ObserverSet::new();
        observers.add(recorder.clone());

        let handle = {
            let state = state.clone();
            let metrics = metrics.clone();
            thread::spawn(move || {
                fusion_loop(
                    sensor_rx,
                    command_rx,
                    shutdown_rx,
                    MahonyFilter::new(start),
                    state,
                    observers,
                    metrics,
                )
            })
        };

        for i in 1..=50u64 {
            sensor_tx
                .send(level_sample(start + Duration::from_millis(20 * i)))
                .unwrap();
        }
        let command = RemoteCommand {
            yaw: 1,
            pitch: -1,
            roll: 10,
            throttle: 500,
            aux1: 0,
            aux2: 7,
        };
        command_tx.send(command).unwrap();

        // 命令通道关闭后姿态估计继续
        drop(command_tx);
        sensor_tx
            .send(level_sample(start + Duration::from_millis(20 * 51)))
            .unwrap();
        // 时间戳重复，被拒绝
        sensor_tx
            .send(level_sample(start + Duration::from_millis(20 * 51)))
            .unwrap();

        drop(sensor_tx);
        handle.join().unwrap();
        drop(shutdown_tx);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.filter_updates, 51);
        assert_eq!(snapshot.filter_rejected, 1);
        assert_eq!(recorder.orientations.load(Ordering::Relaxed), 51);
        assert_eq!(recorder.commands.load(Ordering::Relaxed), 1);

        let attitude = state.attitude();
        assert_eq!(attitude.updates, 51);
        assert_eq!(attitude.sample_count, 40);
        assert!(attitude.orientation.pitch.abs() < 0.05);
        assert!(attitude.orientation.roll.abs() < 0.05);
        assert_eq!(state.last_command().map(|c| c.command), Some(command));
    }

    #[test]
    fn test_fusion_converts_gyro_to_radians() {
        let (sensor_tx, sensor_rx) = bounded(0);
        let (_command_tx, command_rx) = bounded::<RemoteCommand>(0);
        let (_shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let start = Instant::now();
        let state = Arc::new(CopterState::new());

        let handle = {
            let state = state.clone();
            thread::spawn(move || {
                fusion_loop(
                    sensor_rx,
                    command_rx,
                    shutdown_rx,
                    MahonyFilter::new(start),
                    state,
                    ObserverSet::new(),
                    Arc::new(PipelineMetrics::new()),
                )
            })
        };

        // 只有陀螺仪输入：绕 z 轴 90 deg/s，持续 0.5 s
        for i in 1..=25u64 {
            sensor_tx
                .send(SummarizedSample {
                    timestamp: start + Duration::from_millis(20 * i),
                    gyro: Vector3::new(0.0, 0.0, 90.0),
                    accel: Vector3::zeros(),
                    mag: Vector3::zeros(),
                    sample_count: 1,
                })
                .unwrap();
        }
        drop(sensor_tx);
        handle.join().unwrap();

        assert_relative_eq!(state.orientation().yaw.abs().to_degrees(), 45.0, epsilon = 0.5);
    }

    #[test]
    fn test_fusion_exits_on_shutdown_signal() {
        let (_sensor_tx, sensor_rx) = bounded::<SummarizedSample>(0);
        let (_command_tx, command_rx) = bounded::<RemoteCommand>(0);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || {
            fusion_loop(
                sensor_rx,
                command_rx,
                shutdown_rx,
                MahonyFilter::new(Instant::now()),
                Arc::new(CopterState::new()),
                ObserverSet::new(),
                Arc::new(PipelineMetrics::new()),
            )
        });

        drop(shutdown_tx);
        handle.join().unwrap();
    }

    fn spawn_command_loop(
        layout: CommandLayout,
    ) -> (
        SocketAddr,
        Receiver<RemoteCommand>,
        Arc<AtomicBool>,
        Arc<PipelineMetrics>,
        thread::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = bounded(0);
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::new());
        let handle = {
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            thread::spawn(move || command_loop(listener, tx, layout, is_running, metrics))
        };
        (addr, rx, is_running, metrics, handle)
    }

    #[test]
    fn test_command_loop_reassembles_short_reads() {
        let (addr, rx, is_running, metrics, handle) = spawn_command_loop(CommandLayout::Declared);
        let packet = [0x00, 0x01, 0xFF, 0xFF, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x03, 0x00, 0x04];

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&packet[..5]).unwrap();
        client.flush().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        client.write_all(&packet[5..]).unwrap();

        let command = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            command,
            RemoteCommand {
                yaw: 1,
                pitch: -1,
                roll: 10,
                throttle: 0,
                aux1: 3,
                aux2: 4,
            }
        );

        // 两帧连在一起发送
        let mut double = packet.to_vec();
        double.extend_from_slice(&packet);
        client.write_all(&double).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), command);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), command);

        is_running.store(false, Ordering::Release);
        drop(client);
        wake_listener(addr);
        handle.join().unwrap();
        assert_eq!(metrics.snapshot().commands_received, 3);
    }

    #[test]
    fn test_command_loop_reaccepts_after_disconnect() {
        let (addr, rx, is_running, metrics, handle) = spawn_command_loop(CommandLayout::Legacy);
        let command = RemoteCommand {
            yaw: -5,
            pitch: 6,
            roll: 7,
            throttle: 800,
            aux1: 1,
            aux2: 2,
        };

        for _ in 0..2 {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(&command.encode()).unwrap();
            let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            // 旧布局：第六个字段写进 aux1
            assert_eq!(received.aux1, 2);
            assert_eq!(received.aux2, 0);
            assert_eq!(received.throttle, 800);
        }

        is_running.store(false, Ordering::Release);
        wake_listener(addr);
        handle.join().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_received, 2);
        assert_eq!(snapshot.connections_accepted, 2);
    }

    #[test]
    fn test_command_loop_exits_when_fusion_gone() {
        let (addr, rx, _is_running, _metrics, handle) = spawn_command_loop(CommandLayout::Declared);
        drop(rx);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&RemoteCommand::default().encode()).unwrap();
        handle.join().unwrap();
    }
}
