//! # Copter Protocol
//!
//! 遥控指令通道的线格式定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 遥控指令包（12 字节，6 个通道）的解码与编码
//!
//! ## 字节序
//!
//! 指令包使用网络字节序（大端，高位在前）。

pub mod command;

// 重新导出常用类型
pub use command::{COMMAND_PACKET_LEN, CommandLayout, RemoteCommand};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown command layout: {0}")]
    UnknownLayout(String),
}
