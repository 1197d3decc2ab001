//! 外设 Hub
//!
//! 唯一驱动共享 DMA 引擎的任务。调度循环在所有已注册外设的三条上行通道
//! 以及内部 DMA 请求信号上做多路等待，每次服务一个就绪的源。
//!
//! # 源与公平性
//!
//! 源按 `(槽位 0, FROM_DMA)`, `(槽位 0, TO_DMA)`, `(槽位 0, CONTROL)`,
//! `(槽位 1, FROM_DMA)` ... 排列，DMA 请求信号排在最后。
//!
//! - [`Fairness::RoundRobin`]: 从上次服务的源的下一个开始扫描
//! - [`Fairness::FixedPriority`]: 总是从槽位 0 开始扫描
//!
//! # 协议
//!
//! - 接收: `RxReady` 使会话就绪；就绪后的 `RxXfer { max_len }` 从引擎读取至多
//!   `max_len` 字节入接收队列，应答 `RxDone { len }`
//! - 发送: `TxXfer { len }` 表示发送队列里已有一帧，Hub 立即应答 `TxAccepted`，
//!   之后按序把帧交给引擎；引擎忙时等待 [`hub_dma_request`](PeripheralTable::hub_dma_request)
//! - 控制: `Irq(bits)` 置位设备自定义状态位并投递中断，`Reply(word)` 转交控制方
//!
//! 非零长度的传输完成后置位对应状态位，并在 `handler_register` 指定的核心上挂起中断。
//! Hub 的应答一律非阻塞发送，停滞的外设只会卡住它自己的会话。

use core::future::poll_fn;
use core::task::{Context, Poll};

use crate::config::CHANNEL_COUNT;
use crate::error::{EngineBusy, XferError};
use crate::interrupt::IrqRouter;
use crate::mem::DmaFrame;
use crate::soc::channel::{ChannelLink, ChannelRole, Message};
use crate::soc::registry::{PeripheralHandle, PeripheralTable};
use crate::soc::status::IrqStatus;
use crate::sync::AtomicCounter;
use crate::{log_debug, log_error, log_info, log_warn};

/// 共享 DMA 引擎
pub trait DmaEngine {
    /// 为 `handle` 读取至多 `buf.len()` 字节，返回实际字节数，0 表示暂无数据
    fn receive(&mut self, handle: PeripheralHandle, buf: &mut [u8]) -> usize;

    /// 为 `handle` 发送一整帧，引擎忙时返回 `EngineBusy`，稍后通过
    /// `hub_dma_request` 通知 Hub 重试
    fn transmit(&mut self, handle: PeripheralHandle, data: &[u8]) -> Result<(), EngineBusy>;
}

/// 多个源同时就绪时的选择顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fairness {
    /// 轮转
    #[default]
    RoundRobin,
    /// 槽位编号越小优先级越高
    FixedPriority,
}

/// 协议违规的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// 复位出错外设的会话，其余外设不受影响
    #[default]
    ResetSession,
    /// 整个 Hub panic
    Abort,
}

/// Hub 运行时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubConfig {
    pub fairness: Fairness,
    pub violation: ViolationPolicy,
}

/// 被服务的源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Channel { slot: usize, role: ChannelRole },
    DmaRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxPhase {
    Idle,
    Ready,
}

/// 每个槽位的会话状态，按句柄代数区分前后两任外设
#[derive(Debug, Clone, Copy)]
struct Session {
    generation: Option<u16>,
    rx: RxPhase,
    /// 已应答但尚未交给引擎的帧数
    tx_backlog: usize,
}

impl Session {
    const IDLE: Self = Self {
        generation: None,
        rx: RxPhase::Idle,
        tx_backlog: 0,
    };

    fn fresh(generation: u16) -> Self {
        Self {
            generation: Some(generation),
            ..Self::IDLE
        }
    }
}

/// Hub 统计
pub struct HubStats {
    rx_bytes: AtomicCounter,
    tx_bytes: AtomicCounter,
    transfers: AtomicCounter,
    faults: AtomicCounter,
}

impl HubStats {
    const fn new() -> Self {
        Self {
            rx_bytes: AtomicCounter::new(),
            tx_bytes: AtomicCounter::new(),
            transfers: AtomicCounter::new(),
            faults: AtomicCounter::new(),
        }
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.get()
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.get()
    }

    /// 完成的非零长度传输数
    pub fn transfers(&self) -> u64 {
        self.transfers.get()
    }

    /// 协议违规次数
    pub fn faults(&self) -> u64 {
        self.faults.get()
    }
}

/// 外设 Hub
pub struct PeripheralHub<'a, E, const N: usize> {
    table: &'a PeripheralTable<N>,
    router: &'a IrqRouter,
    engine: E,
    config: HubConfig,
    sessions: [Session; N],
    cursor: usize,
    stats: HubStats,
}

impl<'a, E: DmaEngine, const N: usize> PeripheralHub<'a, E, N> {
    /// 源总数: 每个槽位三条通道加 DMA 请求
    const SOURCES: usize = N * CHANNEL_COUNT + 1;

    pub fn new(
        table: &'a PeripheralTable<N>,
        router: &'a IrqRouter,
        engine: E,
        config: HubConfig,
    ) -> Self {
        Self {
            table,
            router,
            engine,
            config,
            sessions: [Session::IDLE; N],
            cursor: 0,
            stats: HubStats::new(),
        }
    }

    pub fn config(&self) -> HubConfig {
        self.config
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// 调度循环，永不返回
    pub async fn run(&mut self) -> ! {
        log_info!(
            "hub started: {} slots, {} sources",
            N,
            Self::SOURCES
        );
        loop {
            self.service_once().await;
        }
    }

    /// 等待任一源就绪并服务一次，返回被服务的源
    pub async fn service_once(&mut self) -> Source {
        let (source, msg) = poll_fn(|cx| self.poll_sources(cx)).await;
        match (source, msg) {
            (Source::Channel { slot, role }, Some(msg)) => self.dispatch(slot, role, msg),
            _ => self.pump_all(),
        }
        source
    }

    fn poll_sources(&mut self, cx: &mut Context<'_>) -> Poll<(Source, Option<Message>)> {
        self.table.register_hub_waker(cx.waker());

        let start = match self.config.fairness {
            Fairness::RoundRobin => self.cursor,
            Fairness::FixedPriority => 0,
        };
        for step in 0..Self::SOURCES {
            let k = (start + step) % Self::SOURCES;
            let ready = if k == N * CHANNEL_COUNT {
                self.table
                    .take_dma_request()
                    .then_some((Source::DmaRequest, None))
            } else {
                self.poll_channel(k / CHANNEL_COUNT, ChannelRole::ALL[k % CHANNEL_COUNT], cx)
            };
            if let Some(ready) = ready {
                self.cursor = (k + 1) % Self::SOURCES;
                return Poll::Ready(ready);
            }
        }
        Poll::Pending
    }

    fn poll_channel(
        &mut self,
        slot: usize,
        role: ChannelRole,
        cx: &mut Context<'_>,
    ) -> Option<(Source, Option<Message>)> {
        let (handle, channels) = self.table.live_slot(slot)?;
        self.session(handle);
        match channels.link(role).up.poll_receive(cx) {
            Poll::Ready(msg) => Some((Source::Channel { slot, role }, Some(msg))),
            Poll::Pending => None,
        }
    }

    /// 取槽位会话，外设换代时重置
    fn session(&mut self, handle: PeripheralHandle) -> &mut Session {
        let session = &mut self.sessions[handle.index()];
        if session.generation != Some(handle.generation()) {
            *session = Session::fresh(handle.generation());
        }
        session
    }

    fn dispatch(&mut self, slot: usize, role: ChannelRole, msg: Message) {
        // 槽位在取到消息之后被注销时丢弃
        let Some((handle, channels)) = self.table.live_slot(slot) else {
            return;
        };
        let link = channels.link(role);

        let transfer = matches!(
            msg,
            Message::RxXfer { .. } | Message::TxXfer { .. } | Message::Irq(_)
        );
        if transfer && self.table.handler(handle).is_none() {
            self.violation(handle, link, "transfer before handler_register");
            return;
        }

        match (role, msg) {
            (ChannelRole::FromDma, Message::RxReady) => {
                self.session(handle).rx = RxPhase::Ready;
            }
            (ChannelRole::FromDma, Message::RxXfer { max_len }) => {
                if self.session(handle).rx != RxPhase::Ready {
                    self.violation(handle, link, "rx transfer without rx ready");
                    return;
                }
                self.session(handle).rx = RxPhase::Idle;
                self.rx_transfer(handle, link, max_len as usize);
            }
            (ChannelRole::ToDma, Message::TxXfer { len }) => {
                self.tx_request(handle, link, len as usize);
            }
            (ChannelRole::Control, Message::Irq(bits)) => {
                if !bits.is_empty() {
                    self.table.complete(handle, bits, self.router);
                }
            }
            (ChannelRole::Control, Message::Reply(word)) => {
                link.reply.signal(Ok(word));
            }
            _ => self.violation(handle, link, "unexpected message"),
        }
    }

    fn rx_transfer(&mut self, handle: PeripheralHandle, link: &ChannelLink, max_len: usize) {
        let table = self.table;
        let rx = table.rx_dma_ring_buf(handle);

        let len = if max_len == 0 {
            0
        } else if rx.is_full() {
            log_warn!("slot {} receive queue full", handle.index());
            0
        } else {
            let mut frame = DmaFrame::new();
            let engine = &mut self.engine;
            let len = frame.fill_with(max_len, |window| engine.receive(handle, window));
            if len > 0 && rx.push(frame).is_err() {
                // 上面检查过未满，生产者只有 Hub
                self.violation(handle, link, "receive queue overrun");
                return;
            }
            len
        };

        if len > 0 {
            self.stats.rx_bytes.add(len as u64);
            self.stats.transfers.increment();
            table.complete(handle, IrqStatus::DMA_RX_DONE, self.router);
        }
        self.reply(handle, link, Message::RxDone { len: len as u16 });
    }

    fn tx_request(&mut self, handle: PeripheralHandle, link: &ChannelLink, len: usize) {
        if len > 0 {
            if self.table.tx_dma_ring_buf(handle).is_empty() {
                self.violation(handle, link, "tx transfer with empty transmit queue");
                return;
            }
            self.session(handle).tx_backlog += 1;
        }
        if self.reply(handle, link, Message::TxAccepted) && len > 0 {
            self.pump(handle);
        }
    }

    /// 把会话中已应答的帧按序交给引擎
    fn pump(&mut self, handle: PeripheralHandle) {
        let table = self.table;
        let tx = table.tx_dma_ring_buf(handle);

        while self.session(handle).tx_backlog > 0 {
            let Some(frame) = tx.peek() else {
                self.session(handle).tx_backlog = 0;
                break;
            };
            if self.engine.transmit(handle, frame.as_slice()).is_err() {
                log_debug!("dma engine busy, slot {} deferred", handle.index());
                break;
            }
            let bytes = frame.len();
            tx.pop();
            self.session(handle).tx_backlog -= 1;
            self.stats.tx_bytes.add(bytes as u64);
            self.stats.transfers.increment();
            table.complete(handle, IrqStatus::DMA_TX_DONE, self.router);
        }
    }

    fn pump_all(&mut self) {
        for slot in 0..N {
            if let Some((handle, _)) = self.table.live_slot(slot) {
                if self.session(handle).tx_backlog > 0 {
                    self.pump(handle);
                }
            }
        }
    }

    /// 非阻塞应答，外设未取走上一条应答即视为违规
    fn reply(&mut self, handle: PeripheralHandle, link: &ChannelLink, msg: Message) -> bool {
        if link.down.try_send(msg).is_err() {
            self.violation(handle, link, "reply mailbox full");
            return false;
        }
        true
    }

    fn violation(&mut self, handle: PeripheralHandle, link: &ChannelLink, what: &'static str) {
        self.stats.faults.increment();
        log_error!("slot {} protocol violation: {}", handle.index(), what);

        match self.config.violation {
            ViolationPolicy::Abort => {
                panic!("protocol violation on slot {}: {}", handle.index(), what)
            }
            ViolationPolicy::ResetSession => {
                self.table.tx_dma_ring_buf(handle).drain();
                *self.session(handle) = Session::fresh(handle.generation());
                link.down.clear();
                let _ = link.down.try_send(Message::SessionReset);
                // 控制方可能正在等被丢弃命令的应答
                if core::ptr::eq(link, self.table.channels(handle).control) {
                    link.reply.signal(Err(XferError::SessionReset));
                }
            }
        }
    }
}

/// Hub 入口，永不返回
pub async fn hub<E: DmaEngine, const N: usize>(hub: &mut PeripheralHub<'_, E, N>) -> ! {
    hub.run().await
}
