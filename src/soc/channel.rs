//! 外设通道协议
//!
//! 每个外设持有三条通道链路，角色固定:
//!
//! | 角色 | 编号 | 用途 |
//! |------|------|------|
//! | `FROM_DMA` | 0 | 接收握手: `RxReady` → `RxXfer` → `RxDone` |
//! | `TO_DMA`   | 1 | 发送握手: `TxXfer` → `TxAccepted` |
//! | `CONTROL`  | 2 | 带外控制: 控制方下发命令，外设上报 `Irq` / `Reply` |
//!
//! 每条链路由上行 (外设 → Hub)、下行 (Hub/控制方 → 外设) 两个容量为 1 的
//! 通道组成，请求-应答交替进行，等价于同步通道。数据本身不走通道，
//! 而是经由注册表里该外设的收发环形队列。
//!
//! # 示例
//!
//! ```rust,ignore
//! let rx = TABLE.chanend(handle, ChannelRole::FromDma);
//! rx_dma_ready(&rx).await;
//! let n = rx_dma_xfer(&rx, &mut buf, 64).await?;
//! ```

use crate::config::{DMA_FRAME_SIZE, DMA_RING_DEPTH};
use crate::error::XferError;
use crate::mem::DmaFrame;
use crate::soc::status::IrqStatus;
use crate::sync::{CriticalChannel, CriticalSignal, RingBuffer};

/// 一个方向的 DMA 环形队列
pub type DmaRing = RingBuffer<DmaFrame, DMA_RING_DEPTH>;

/// 通道角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelRole {
    /// Hub → 外设，交付接收数据
    FromDma = 0,
    /// 外设 → Hub，提交待发送数据
    ToDma = 1,
    /// 带外控制
    Control = 2,
}

impl ChannelRole {
    /// 全部角色，按编号排列
    pub const ALL: [Self; 3] = [Self::FromDma, Self::ToDma, Self::Control];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// 通道上的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// 外设准备好接收
    RxReady,
    /// 请求至多 `max_len` 字节的接收
    RxXfer { max_len: u16 },
    /// 接收完成，`len` 字节已入接收队列
    RxDone { len: u16 },
    /// 发送队列中已放入 `len` 字节的一帧
    TxXfer { len: u16 },
    /// Hub 已接管发送
    TxAccepted,
    /// 控制命令 (控制方 → 外设)
    Command(u32),
    /// 控制应答 (外设 → 控制方，经 Hub 转交)
    Reply(u32),
    /// 外设自报的中断状态位
    Irq(IrqStatus),
    /// Hub 复位了本会话
    SessionReset,
}

/// 一条双向通道链路
pub struct ChannelLink {
    /// 外设 → Hub
    pub(crate) up: CriticalChannel<Message, 1>,
    /// Hub 或控制方 → 外设
    pub(crate) down: CriticalChannel<Message, 1>,
    /// 控制应答槽，仅 `CONTROL` 链路使用；会话被复位时为 `Err`
    pub(crate) reply: CriticalSignal<Result<u32, XferError>>,
}

impl ChannelLink {
    pub const fn new() -> Self {
        Self {
            up: CriticalChannel::new(),
            down: CriticalChannel::new(),
            reply: CriticalSignal::new(),
        }
    }

    /// 清空两个方向上残留的消息
    pub(crate) fn clear(&self) {
        self.up.clear();
        self.down.clear();
        self.reply.reset();
    }
}

impl Default for ChannelLink {
    fn default() -> Self {
        Self::new()
    }
}

/// 一个外设的三条通道
#[derive(Clone, Copy)]
pub struct ChannelTriple {
    pub from_dma: &'static ChannelLink,
    pub to_dma: &'static ChannelLink,
    pub control: &'static ChannelLink,
}

impl ChannelTriple {
    pub const fn new(
        from_dma: &'static ChannelLink,
        to_dma: &'static ChannelLink,
        control: &'static ChannelLink,
    ) -> Self {
        Self {
            from_dma,
            to_dma,
            control,
        }
    }

    /// 按角色取链路
    pub fn link(&self, role: ChannelRole) -> &'static ChannelLink {
        match role {
            ChannelRole::FromDma => self.from_dma,
            ChannelRole::ToDma => self.to_dma,
            ChannelRole::Control => self.control,
        }
    }

    /// 是否与另一组共用任何链路
    pub(crate) fn overlaps(&self, other: &ChannelTriple) -> bool {
        ChannelRole::ALL
            .iter()
            .any(|&a| ChannelRole::ALL.iter().any(|&b| core::ptr::eq(self.link(a), other.link(b))))
    }

    /// 三条链路是否互不相同
    pub(crate) fn is_distinct(&self) -> bool {
        !core::ptr::eq(self.from_dma, self.to_dma)
            && !core::ptr::eq(self.from_dma, self.control)
            && !core::ptr::eq(self.to_dma, self.control)
    }
}

impl core::fmt::Debug for ChannelTriple {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelTriple")
            .field("from_dma", &(self.from_dma as *const ChannelLink))
            .field("to_dma", &(self.to_dma as *const ChannelLink))
            .field("control", &(self.control as *const ChannelLink))
            .finish()
    }
}

// =============================================
// 外设侧通道端点
// =============================================

/// 外设持有的通道端点
///
/// 由 [`PeripheralTable::chanend`](super::registry::PeripheralTable::chanend) 创建，
/// 绑定一条链路和该外设的收发队列
#[derive(Clone, Copy)]
pub struct Chanend<'a> {
    role: ChannelRole,
    link: &'a ChannelLink,
    rx: &'a DmaRing,
    tx: &'a DmaRing,
}

impl<'a> Chanend<'a> {
    pub(crate) fn new(
        role: ChannelRole,
        link: &'a ChannelLink,
        rx: &'a DmaRing,
        tx: &'a DmaRing,
    ) -> Self {
        Self { role, link, rx, tx }
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    async fn expect_reply(&self) -> Result<Message, XferError> {
        match self.link.down.receive().await {
            Message::SessionReset => Err(XferError::SessionReset),
            msg => Ok(msg),
        }
    }
}

/// 通知 Hub 本外设准备好接收
pub async fn rx_dma_ready(c: &Chanend<'_>) {
    debug_assert_eq!(c.role, ChannelRole::FromDma);
    c.link.up.send(Message::RxReady).await;
}

/// 请求至多 `max_length` 字节的 DMA 接收，写入 `buf`，返回实际长度
///
/// 实际上限为 `max_length`、`buf.len()` 与帧容量三者的最小值。
/// 返回 0 表示当前没有数据，不是错误；多余的数据留待下一次调用。
/// `max_length == 0` 时仍完成一次握手，且不写 `buf`。
pub async fn rx_dma_xfer(
    c: &Chanend<'_>,
    buf: &mut [u8],
    max_length: usize,
) -> Result<usize, XferError> {
    debug_assert_eq!(c.role, ChannelRole::FromDma);
    let window = max_length.min(buf.len()).min(DMA_FRAME_SIZE);
    c.link
        .up
        .send(Message::RxXfer { max_len: window as u16 })
        .await;

    match c.expect_reply().await? {
        Message::RxDone { len: 0 } => Ok(0),
        Message::RxDone { len } => {
            let frame = c.rx.pop().ok_or(XferError::UnexpectedMessage)?;
            debug_assert_eq!(frame.len(), len as usize);
            Ok(frame.copy_to_slice(&mut buf[..window]))
        }
        _ => Err(XferError::UnexpectedMessage),
    }
}

/// 提交 `buf[..length]` 的 DMA 发送
///
/// 帧先放入发送队列，再与 Hub 握手；Hub 接管后即返回，从外设视角是原子的。
/// `length == 0` 不入队，但仍完成握手。
pub async fn tx_dma_xfer(c: &Chanend<'_>, buf: &[u8], length: usize) -> Result<(), XferError> {
    debug_assert_eq!(c.role, ChannelRole::ToDma);
    let data = buf.get(..length).ok_or(XferError::FrameTooLarge {
        len: length,
        max: buf.len(),
    })?;
    if length > 0 {
        let frame = DmaFrame::from_slice(data).ok_or(XferError::FrameTooLarge {
            len: length,
            max: DMA_FRAME_SIZE,
        })?;
        c.tx.push(frame).map_err(|_| XferError::QueueFull)?;
    }
    c.link
        .up
        .send(Message::TxXfer { len: length as u16 })
        .await;

    match c.expect_reply().await? {
        Message::TxAccepted => Ok(()),
        _ => Err(XferError::UnexpectedMessage),
    }
}

/// 外设等待下一条控制命令
pub async fn recv_command(c: &Chanend<'_>) -> Result<u32, XferError> {
    debug_assert_eq!(c.role, ChannelRole::Control);
    match c.expect_reply().await? {
        Message::Command(word) => Ok(word),
        _ => Err(XferError::UnexpectedMessage),
    }
}

/// 外设向控制方应答
pub async fn send_reply(c: &Chanend<'_>, word: u32) {
    debug_assert_eq!(c.role, ChannelRole::Control);
    c.link.up.send(Message::Reply(word)).await;
}

/// 外设上报自定义中断状态位，由 Hub 置位并投递中断
pub async fn raise_irq(c: &Chanend<'_>, bits: IrqStatus) {
    debug_assert_eq!(c.role, ChannelRole::Control);
    c.link.up.send(Message::Irq(bits)).await;
}

// =============================================
// 控制方端点
// =============================================

/// 控制通道的控制方端点，绕过 Hub 的数据通路直接与外设对话
#[derive(Clone, Copy)]
pub struct ControlEnd {
    link: &'static ChannelLink,
}

impl ControlEnd {
    pub(crate) fn new(link: &'static ChannelLink) -> Self {
        Self { link }
    }

    /// 下发一条命令，外设取走前挂起
    pub async fn command(&self, word: u32) {
        self.link.down.send(Message::Command(word)).await;
    }

    /// 等待外设的下一条应答
    ///
    /// Hub 在等待期间复位了控制会话时返回 `SessionReset`
    pub async fn reply(&self) -> Result<u32, XferError> {
        self.link.reply.wait().await
    }

    /// 命令并等待应答，先丢弃上一轮残留的应答
    pub async fn transact(&self, word: u32) -> Result<u32, XferError> {
        self.link.reply.reset();
        self.command(word).await;
        self.reply().await
    }

    pub fn link(&self) -> &'static ChannelLink {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_numbering() {
        assert_eq!(ChannelRole::FromDma.index(), 0);
        assert_eq!(ChannelRole::ToDma.index(), 1);
        assert_eq!(ChannelRole::Control.index(), 2);
        assert_eq!(ChannelRole::ALL.len(), crate::config::CHANNEL_COUNT);
    }

    #[test]
    fn test_triple_overlap() {
        static L: [ChannelLink; 4] = [const { ChannelLink::new() }; 4];
        let a = ChannelTriple::new(&L[0], &L[1], &L[2]);
        let b = ChannelTriple::new(&L[3], &L[2], &L[3]);
        assert!(a.is_distinct());
        assert!(!b.is_distinct());
        assert!(a.overlaps(&b));
        let c = ChannelTriple::new(&L[3], &L[3], &L[3]);
        assert!(!a.overlaps(&c));
    }
}
