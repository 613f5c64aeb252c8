//! 遥控指令包
//!
//! 每个指令包固定 12 字节，依次为 6 个大端有符号 16 位通道值：
//!
//! ```text
//! offset  0    2      4     6         8     10
//!        [yaw][pitch][roll][throttle][aux1][aux2]
//! ```

use crate::ProtocolError;
use std::str::FromStr;

/// 指令包长度（字节）
pub const COMMAND_PACKET_LEN: usize = 12;

/// 第六个通道的落位方式
///
/// 早期地面站的解码器把第六个字段写进了 `aux1` 的位置（`aux2` 永远为 0）。
/// 与这类对端保持逐位兼容时使用 [`CommandLayout::Legacy`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum CommandLayout {
    /// 按声明顺序解码：第六个字段进入 `aux2`
    #[default]
    Declared,
    /// 兼容旧对端：第六个字段覆盖 `aux1`，`aux2` 保持 0
    Legacy,
}

impl FromStr for CommandLayout {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "declared" => Ok(Self::Declared),
            "legacy" => Ok(Self::Legacy),
            other => Err(ProtocolError::UnknownLayout(other.to_string())),
        }
    }
}

/// 遥控指令（一包一条，无状态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoteCommand {
    pub yaw: i16,
    pub pitch: i16,
    pub roll: i16,
    pub throttle: i16,
    pub aux1: i16,
    pub aux2: i16,
}

impl RemoteCommand {
    /// 解码一个完整的指令包
    pub fn decode(packet: &[u8; COMMAND_PACKET_LEN], layout: CommandLayout) -> Self {
        let field = |i: usize| i16::from_be_bytes([packet[2 * i], packet[2 * i + 1]]);

        let mut cmd = RemoteCommand {
            yaw: field(0),
            pitch: field(1),
            roll: field(2),
            throttle: field(3),
            aux1: field(4),
            aux2: 0,
        };

        match layout {
            CommandLayout::Declared => cmd.aux2 = field(5),
            CommandLayout::Legacy => cmd.aux1 = field(5),
        }

        cmd
    }

    /// 按声明顺序编码（供测试对端和地面站工具使用）
    pub fn encode(&self) -> [u8; COMMAND_PACKET_LEN] {
        let mut packet = [0u8; COMMAND_PACKET_LEN];
        let fields = [
            self.yaw,
            self.pitch,
            self.roll,
            self.throttle,
            self.aux1,
            self.aux2,
        ];
        for (chunk, value) in packet.chunks_exact_mut(2).zip(fields) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        packet
    }
}
