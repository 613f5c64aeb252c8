//! 通用设备采样模型
//!
//! [`DeviceSampler`] 负责总线读取、累加、去偏和单位换算；
//! 设备之间的差异（地址、字节序、轴交换、灵敏度）由 [`DeviceModel`] 描述。

use crate::SensorError;
use copter_bus::Bus;
use nalgebra::Vector3;
use std::sync::Arc;
use tracing::{debug, trace};

/// 单个三轴设备的寄存器布局和换算规则
pub trait DeviceModel: Send {
    /// 设备名（日志和错误信息使用）
    fn name(&self) -> &'static str;

    /// 外设地址
    fn address(&self) -> u8;

    /// 数据寄存器起始地址（已按需或上自增位）
    fn data_register(&self) -> u8;

    /// 把 6 字节原始数据解码为 x, y, z 计数值（处理字节序和轴交换）
    fn decode(&self, raw: &[u8; 6]) -> [i16; 3];

    /// 每个计数值对应的物理量（按轴）
    fn scale(&self) -> Vector3<f32>;

    /// 上电初始化需要写入的寄存器序列
    fn power_up(&self) -> Vec<(u8, u8)>;

    /// 写寄存器之前的校验，不支持的配置返回错误（此时不会发生总线写入）
    fn check_write(&self, _register: u8, _value: u8) -> Result<(), SensorError> {
        Ok(())
    }

    /// 寄存器写入成功后调用，用于同步量程/增益对应的灵敏度
    fn register_written(&mut self, _register: u8, _value: u8) {}
}

/// 三轴累加器
///
/// 只在 evaluate / compute_bias 时整体取出并清零。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    sum: [i64; 3],
    count: u32,
}

impl Accumulator {
    pub fn add(&mut self, sample: [i16; 3]) {
        for (sum, value) in self.sum.iter_mut().zip(sample) {
            *sum += i64::from(value);
        }
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 取出均值并清零，没有样本时返回 `None`（累加器保持不变）
    pub fn take_mean(&mut self) -> Option<Vector3<f32>> {
        if self.count == 0 {
            return None;
        }
        let n = f64::from(self.count);
        let mean = Vector3::new(
            (self.sum[0] as f64 / n) as f32,
            (self.sum[1] as f64 / n) as f32,
            (self.sum[2] as f64 / n) as f32,
        );
        *self = Self::default();
        Some(mean)
    }
}

/// 单个传感器的采样器
///
/// 由采集线程独占（`&mut self`），累加器不会被并发读写。
/// 偏置以原始计数值保存，换算时先去偏再乘灵敏度。
pub struct DeviceSampler<M: DeviceModel> {
    bus: Arc<Bus>,
    model: M,
    accumulator: Accumulator,
    bias: Vector3<f32>,
}

impl<M: DeviceModel> DeviceSampler<M> {
    /// 创建采样器，不进行任何总线操作
    pub fn new(bus: Arc<Bus>, model: M) -> Self {
        Self {
            bus,
            model,
            accumulator: Accumulator::default(),
            bias: Vector3::zeros(),
        }
    }

    /// 创建采样器并执行上电初始化
    pub fn init(bus: Arc<Bus>, model: M) -> Result<Self, SensorError> {
        let mut sampler = Self::new(bus, model);
        for (register, value) in sampler.model.power_up() {
            sampler.write_register(register, value)?;
        }
        debug!(
            "{} initialized at 0x{:02X} on bus {}",
            sampler.name(),
            sampler.model.address(),
            sampler.bus.number()
        );
        Ok(sampler)
    }

    pub fn name(&self) -> &'static str {
        self.model.name()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// 读取一帧并累加
    ///
    /// 读取失败时丢弃本帧（计数不增加），返回是否成功累加。
    pub fn measure(&mut self) -> bool {
        match self.read_raw() {
            Ok(sample) => {
                self.accumulator.add(sample);
                true
            },
            Err(e) => {
                trace!("{} sample dropped: {}", self.name(), e);
                false
            },
        }
    }

    /// 去偏后的均值（物理单位），随后清空累加器
    pub fn evaluate(&mut self) -> Result<Vector3<f32>, SensorError> {
        let mean = self
            .accumulator
            .take_mean()
            .ok_or(SensorError::NoSamples { device: self.name() })?;
        Ok(self.to_units(mean))
    }

    /// 把当前原始均值记为偏置，随后清空累加器
    ///
    /// 仅在静止标定阶段使用。
    pub fn compute_bias(&mut self) -> Result<(), SensorError> {
        let mean = self
            .accumulator
            .take_mean()
            .ok_or(SensorError::NoSamples { device: self.name() })?;
        self.bias = mean;
        debug!(
            "{} bias set to ({:.1}, {:.1}, {:.1})",
            self.name(),
            mean.x,
            mean.y,
            mean.z
        );
        Ok(())
    }

    /// 单次读取并换算，不影响累加器
    pub fn read_xyz(&self) -> Result<Vector3<f32>, SensorError> {
        let [x, y, z] = self.read_raw()?;
        Ok(self.to_units(Vector3::new(f32::from(x), f32::from(y), f32::from(z))))
    }

    /// 单次读取原始计数值
    pub fn read_raw(&self) -> Result<[i16; 3], SensorError> {
        let mut raw = [0u8; 6];
        self.bus
            .read_block_into(self.model.address(), self.model.data_register(), &mut raw)?;
        Ok(self.model.decode(&raw))
    }

    /// 读取单个寄存器（按有符号字节解释）
    pub fn read_register(&self, register: u8) -> Result<i8, SensorError> {
        let mut value = [0u8; 1];
        self.bus
            .read_block_into(self.model.address(), register, &mut value)?;
        Ok(value[0] as i8)
    }

    /// 写单个寄存器
    ///
    /// 量程/增益寄存器写入成功后，灵敏度在同一次调用内更新；
    /// 写入失败时灵敏度保持不变。
    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.model.check_write(register, value)?;
        self.bus.write_byte(self.model.address(), register, value)?;
        self.model.register_written(register, value);
        Ok(())
    }

    /// 当前偏置（原始计数值）
    pub fn bias(&self) -> Vector3<f32> {
        self.bias
    }

    pub fn set_bias(&mut self, bias: Vector3<f32>) {
        self.bias = bias;
    }

    /// 自上次 evaluate / compute_bias 以来累积的样本数
    pub fn pending_samples(&self) -> u32 {
        self.accumulator.count()
    }

    /// 丢弃已累积的样本
    pub fn reset(&mut self) {
        self.accumulator = Accumulator::default();
    }

    fn to_units(&self, raw: Vector3<f32>) -> Vector3<f32> {
        (raw - self.bias).component_mul(&self.model.scale())
    }
}

impl<M: DeviceModel> std::fmt::Debug for DeviceSampler<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSampler")
            .field("device", &self.name())
            .field("address", &self.model.address())
            .field("pending", &self.accumulator.count())
            .field("bias", &self.bias)
            .finish()
    }
}
