//! 单条总线：地址缓存 + 传输串行化

use crate::transfer::BlockTransfer;
use crate::{BusError, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// 总线计数器（原子操作，任何线程都可以无锁读取）
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// 实际发出的地址选择次数（缓存命中不计入）
    pub address_selects: AtomicU64,
    /// 成功完成的数据传输次数
    pub transfers: AtomicU64,
    /// 失败的传输次数（包括地址选择失败）
    pub transfer_errors: AtomicU64,
}

impl BusMetrics {
    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            address_selects: self.address_selects.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            transfer_errors: self.transfer_errors.load(Ordering::Relaxed),
        }
    }
}

/// 总线计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusMetricsSnapshot {
    pub address_selects: u64,
    pub transfers: u64,
    pub transfer_errors: u64,
}

/// 锁内状态：传输句柄和当前已选中的外设地址
struct BusState {
    transport: Box<dyn Transport>,
    /// 最近一次成功选择的地址，`None` 表示尚未选择过
    selected: Option<u8>,
}

impl BusState {
    /// 仅当目标地址与缓存不同才发起地址选择
    fn select(&mut self, address: u8, metrics: &BusMetrics) -> Result<(), BusError> {
        if self.selected == Some(address) {
            return Ok(());
        }

        if let Err(source) = self.transport.select_address(address) {
            metrics.transfer_errors.fetch_add(1, Ordering::Relaxed);
            return Err(BusError::Select { address, source });
        }

        trace!("I2C address selected: 0x{:02X}", address);
        metrics.address_selects.fetch_add(1, Ordering::Relaxed);
        self.selected = Some(address);
        Ok(())
    }
}

/// 一条已打开的 I2C 总线
///
/// 所有操作在整个“选择地址 + 传输”期间持有总线锁，
/// 因此不同外设的地址选择和数据传输不会交错。
/// 锁只覆盖单次寄存器传输，不覆盖调用方的整个采样周期。
pub struct Bus {
    number: u8,
    state: Mutex<BusState>,
    metrics: BusMetrics,
}

impl Bus {
    /// 用已打开的传输句柄创建总线
    ///
    /// 通常由 [`BusRegistry`](crate::BusRegistry) 调用；测试中可以直接传入 mock 传输层。
    pub fn new(number: u8, transport: Box<dyn Transport>) -> Self {
        Self {
            number,
            state: Mutex::new(BusState {
                transport,
                selected: None,
            }),
            metrics: BusMetrics::default(),
        }
    }

    /// 总线号
    pub fn number(&self) -> u8 {
        self.number
    }

    /// 读取 `len` 字节，从 `register` 开始
    ///
    /// 需要跨寄存器自动递增时，调用方在 `register` 上或上 [`AUTO_INCREMENT`](crate::AUTO_INCREMENT)。
    pub fn read_block(&self, address: u8, register: u8, len: usize) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; len];
        self.read_block_into(address, register, &mut buf)?;
        Ok(buf)
    }

    /// 读取 `buf.len()` 字节到调用方提供的缓冲区
    pub fn read_block_into(&self, address: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let mut transfer = BlockTransfer::read(register, buf.len())?;

        let mut state = self.state.lock();
        state.select(address, &self.metrics)?;
        self.run(&mut state, address, &mut transfer)?;
        drop(state);

        let payload = transfer.payload();
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(())
    }

    /// 写单个寄存器
    ///
    /// 直接以 `[register, value]` 二元组写入设备文件，不走块传输。
    pub fn write_byte(&self, address: u8, register: u8, value: u8) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.select(address, &self.metrics)?;

        match state.transport.write_bytes(&[register, value]) {
            Ok(2) => {
                self.metrics.transfers.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Ok(written) => {
                self.metrics.transfer_errors.fetch_add(1, Ordering::Relaxed);
                Err(BusError::ShortWrite {
                    address,
                    written,
                    expected: 2,
                })
            },
            Err(source) => {
                self.metrics.transfer_errors.fetch_add(1, Ordering::Relaxed);
                Err(BusError::Transfer {
                    address,
                    register,
                    source,
                })
            },
        }
    }

    /// 块写入（带长度前缀），最长 32 字节
    pub fn write_block(&self, address: u8, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        let mut transfer = BlockTransfer::write(register, bytes)?;

        let mut state = self.state.lock();
        state.select(address, &self.metrics)?;
        self.run(&mut state, address, &mut transfer)
    }

    /// 计数器快照
    pub fn metrics(&self) -> BusMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn run(
        &self,
        state: &mut BusState,
        address: u8,
        transfer: &mut BlockTransfer,
    ) -> Result<(), BusError> {
        match state.transport.block_transfer(transfer) {
            Ok(()) => {
                self.metrics.transfers.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(source) => {
                self.metrics.transfer_errors.fetch_add(1, Ordering::Relaxed);
                Err(BusError::Transfer {
                    address,
                    register: transfer.register(),
                    source,
                })
            },
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("number", &self.number)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
