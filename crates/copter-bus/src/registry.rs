//! 总线注册表
//!
//! 同一总线号在进程内只打开一次，所有外设共享同一个 [`Bus`]（也就共享同一把锁）。
//! 打开失败不会写入注册表，下一次请求会重新尝试打开。

use crate::{Bus, BusError, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type Opener = dyn Fn(u8) -> Result<Box<dyn Transport>, BusError> + Send + Sync;

/// 总线号 → 已打开总线 的映射
pub struct BusRegistry {
    opener: Box<Opener>,
    buses: Mutex<HashMap<u8, Arc<Bus>>>,
}

impl BusRegistry {
    /// 使用 Linux i2c-dev 打开总线（`/dev/i2c-N`）
    #[cfg(target_os = "linux")]
    pub fn new() -> Self {
        Self::with_opener(|number| {
            crate::I2cDevTransport::open(number).map(|t| Box::new(t) as Box<dyn Transport>)
        })
    }

    /// 使用自定义的打开函数（测试或非 Linux 平台）
    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn(u8) -> Result<Box<dyn Transport>, BusError> + Send + Sync + 'static,
    {
        Self {
            opener: Box::new(opener),
            buses: Mutex::new(HashMap::new()),
        }
    }

    /// 获取总线，必要时打开
    ///
    /// 打开过程在注册表锁内完成，并发的首次请求只会打开一次。
    pub fn open(&self, number: u8) -> Result<Arc<Bus>, BusError> {
        let mut buses = self.buses.lock();
        if let Some(bus) = buses.get(&number) {
            debug!("Reusing I2C bus {}", number);
            return Ok(bus.clone());
        }

        let transport = (self.opener)(number)?;
        let bus = Arc::new(Bus::new(number, transport));
        buses.insert(number, bus.clone());
        info!("I2C bus {} opened", number);
        Ok(bus)
    }

    /// 已打开的总线数量
    pub fn len(&self) -> usize {
        self.buses.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(target_os = "linux")]
impl Default for BusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut numbers: Vec<u8> = self.buses.lock().keys().copied().collect();
        numbers.sort_unstable();
        f.debug_struct("BusRegistry").field("open", &numbers).finish()
    }
}
