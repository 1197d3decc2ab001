//! 错误类型
//!
//! 可恢复的失败 (表满、队列满、会话被复位) 以 `Result` 返回；
//! 契约违规 (失效句柄、未知核心) 直接 panic。

use thiserror::Error;

/// 外设注册失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// 注册表已满，容量由板级设备表决定
    #[error("peripheral table is full ({capacity} slots)")]
    TableFull { capacity: usize },
    /// 通道已经绑定到另一个存活的外设
    #[error("channel is already bound to a registered peripheral")]
    ChannelInUse,
}

/// 外设侧 DMA 握手失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum XferError {
    /// 发送环形队列已满，稍后重试
    #[error("transmit ring queue is full")]
    QueueFull,
    /// 单帧超过 DMA 帧上限
    #[error("frame of {len} bytes exceeds the {max} byte DMA frame limit")]
    FrameTooLarge { len: usize, max: usize },
    /// Hub 检测到协议违规并复位了本外设的会话
    #[error("session was reset by the hub")]
    SessionReset,
    /// 收到了握手中不应出现的消息
    #[error("unexpected message on channel")]
    UnexpectedMessage,
}

/// DMA 引擎暂时无法接受新的发送
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dma engine is busy")]
pub struct EngineBusy;
