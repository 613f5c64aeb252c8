//! Mock 传输层（无硬件依赖）
//!
//! 记录每一次地址选择和数据传输，并按外设地址维护一份寄存器镜像。
//! `MockTransport` 可以 `clone()`，所有副本共享同一份状态，
//! 测试代码保留一个副本用于检查，另一个交给 [`Bus`](crate::Bus)。

use crate::transfer::{AUTO_INCREMENT, BlockTransfer, Direction};
use crate::Transport;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;

/// 传输记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// 地址选择（包括失败的尝试）
    Select(u8),
    /// 原始字节写入
    Write { address: u8, bytes: Vec<u8> },
    /// 块读取
    BlockRead { address: u8, register: u8, len: usize },
    /// 块写入，`raw` 含长度前缀
    BlockWrite {
        address: u8,
        register: u8,
        raw: Vec<u8>,
    },
}

#[derive(Default)]
struct MockState {
    ops: Vec<BusOp>,
    selected: Option<u8>,
    registers: HashMap<(u8, u8), u8>,
    queued_reads: HashMap<(u8, u8), VecDeque<Vec<u8>>>,
    failing: HashSet<u8>,
    fail_select: bool,
    short_writes: bool,
}

impl MockState {
    fn current(&self) -> io::Result<u8> {
        self.selected
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address selected"))
    }
}

/// Mock 传输层
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有传输记录（按发生顺序）
    pub fn ops(&self) -> Vec<BusOp> {
        self.inner.lock().ops.clone()
    }

    /// 清空传输记录（不影响寄存器镜像）
    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }

    /// 从 `register` 开始连续设置寄存器镜像
    pub fn set_registers(&self, address: u8, register: u8, values: &[u8]) {
        let mut state = self.inner.lock();
        for (i, value) in values.iter().enumerate() {
            state
                .registers
                .insert((address, register.wrapping_add(i as u8)), *value);
        }
    }

    /// 读取寄存器镜像（未写过的寄存器为 0）
    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.inner
            .lock()
            .registers
            .get(&(address, register))
            .copied()
            .unwrap_or(0)
    }

    /// 为下一次从 `register`（去掉自增位）开始的块读取排队一份返回值；
    /// 队列为空时回落到寄存器镜像
    pub fn queue_read(&self, address: u8, register: u8, data: &[u8]) {
        self.inner
            .lock()
            .queued_reads
            .entry((address, register & !AUTO_INCREMENT))
            .or_default()
            .push_back(data.to_vec());
    }

    /// 此后发往 `address` 的所有数据传输都以 EIO 失败
    pub fn fail_address(&self, address: u8) {
        self.inner.lock().failing.insert(address);
    }

    /// 恢复 `address` 的正常传输
    pub fn heal_address(&self, address: u8) {
        self.inner.lock().failing.remove(&address);
    }

    /// 让地址选择以 ENXIO 失败
    pub fn fail_select(&self, fail: bool) {
        self.inner.lock().fail_select = fail;
    }

    /// 让原始字节写入只写出 1 字节
    pub fn short_writes(&self, short: bool) {
        self.inner.lock().short_writes = short;
    }
}

impl Transport for MockTransport {
    fn select_address(&mut self, address: u8) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.ops.push(BusOp::Select(address));
        if state.fail_select {
            return Err(io::Error::from_raw_os_error(libc::ENXIO));
        }
        state.selected = Some(address);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();
        let address = state.current()?;
        state.ops.push(BusOp::Write {
            address,
            bytes: bytes.to_vec(),
        });
        if state.failing.contains(&address) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        if state.short_writes {
            return Ok(bytes.len().min(1));
        }
        if let [register, values @ ..] = bytes {
            for (i, value) in values.iter().enumerate() {
                state
                    .registers
                    .insert((address, register.wrapping_add(i as u8)), *value);
            }
        }
        Ok(bytes.len())
    }

    fn block_transfer(&mut self, transfer: &mut BlockTransfer) -> io::Result<()> {
        let mut state = self.inner.lock();
        let address = state.current()?;
        let register = transfer.register();
        let base = register & !AUTO_INCREMENT;

        match transfer.direction() {
            Direction::Read => {
                state.ops.push(BusOp::BlockRead {
                    address,
                    register,
                    len: transfer.len(),
                });
                if state.failing.contains(&address) {
                    return Err(io::Error::from_raw_os_error(libc::EIO));
                }
                let queued = state
                    .queued_reads
                    .get_mut(&(address, base))
                    .and_then(|queue| queue.pop_front());
                let out = transfer.payload_mut();
                match queued {
                    Some(data) => {
                        let n = data.len().min(out.len());
                        out[..n].copy_from_slice(&data[..n]);
                    },
                    None => {
                        for (i, byte) in out.iter_mut().enumerate() {
                            *byte = state
                                .registers
                                .get(&(address, base.wrapping_add(i as u8)))
                                .copied()
                                .unwrap_or(0);
                        }
                    },
                }
            },
            Direction::Write => {
                let len = transfer.len();
                let raw = transfer.raw_mut()[..=len].to_vec();
                state.ops.push(BusOp::BlockWrite {
                    address,
                    register,
                    raw,
                });
                if state.failing.contains(&address) {
                    return Err(io::Error::from_raw_os_error(libc::EIO));
                }
                for (i, value) in transfer.payload().iter().enumerate() {
                    state
                        .registers
                        .insert((address, base.wrapping_add(i as u8)), *value);
                }
            },
        }
        Ok(())
    }
}
