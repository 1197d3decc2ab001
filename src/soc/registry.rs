//! 外设注册表
//!
//! 进程级的外设目录: 句柄 → 通道三元组、中断回调、应用上下文、收发环形队列。
//!
//! # 句柄
//!
//! 句柄是 `(槽位, 代数)` 对，只能由 [`PeripheralTable::register`] 创建。
//! 注销会推进槽位代数，之后任何使用旧句柄的查询都会 panic，
//! 而不是悄悄读到别的外设的状态。
//!
//! # 容量
//!
//! 容量是常量泛型，按板级设备表求和 (见 [`devices`](super::devices))，最多 32。

use core::cell::RefCell;
use core::task::Waker;

use embassy_sync::waitqueue::AtomicWaker;
use portable_atomic::{AtomicU32, Ordering};

use crate::error::RegisterError;
use crate::interrupt::{run_isr, AppData, CoreId, InterruptHal, IrqRouter, IsrCallback, Port};
use crate::soc::channel::{ChannelRole, ChannelTriple, Chanend, ControlEnd, DmaRing};
use crate::soc::status::IrqStatus;
use crate::sync::{AtomicFlag, CriticalLock, RingBuffer};
use crate::{log_debug, log_error, log_info, log_warn};

/// 外设句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralHandle {
    slot: u8,
    generation: u16,
}

impl PeripheralHandle {
    /// 槽位编号，用于日志与中断线编号
    pub fn index(&self) -> usize {
        self.slot as usize
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

/// 已注册的中断回调
#[derive(Debug, Clone, Copy)]
pub(crate) struct Handler {
    pub(crate) core: CoreId,
    pub(crate) app_data: AppData,
    pub(crate) isr: IsrCallback,
}

struct Record {
    channels: ChannelTriple,
    handler: Option<Handler>,
}

struct SlotState {
    generation: u16,
    record: Option<Record>,
}

impl SlotState {
    fn live(&self, generation: u16) -> Option<&Record> {
        self.record.as_ref().filter(|_| self.generation == generation)
    }
}

struct Slot {
    state: CriticalLock<RefCell<SlotState>>,
    status: AtomicU32,
    rx: DmaRing,
    tx: DmaRing,
}

impl Slot {
    const fn new() -> Self {
        Self {
            state: CriticalLock::new(RefCell::new(SlotState {
                generation: 0,
                record: None,
            })),
            status: AtomicU32::new(0),
            rx: RingBuffer::new(),
            tx: RingBuffer::new(),
        }
    }

    fn reset_data_path(&self) {
        self.rx.drain();
        self.tx.drain();
        self.status.store(0, Ordering::Release);
    }
}

/// 外设注册表
pub struct PeripheralTable<const N: usize> {
    slots: [Slot; N],
    hub_waker: AtomicWaker,
    dma_request: AtomicFlag,
}

impl<const N: usize> PeripheralTable<N> {
    pub const fn new() -> Self {
        assert!(N <= 32, "peripheral table holds at most 32 slots");
        Self {
            slots: [const { Slot::new() }; N],
            hub_waker: AtomicWaker::new(),
            dma_request: AtomicFlag::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// 当前注册的外设数
    pub fn len(&self) -> usize {
        critical_section::with(|cs| {
            self.slots
                .iter()
                .filter(|slot| slot.state.borrow(cs).borrow().record.is_some())
                .count()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 注册外设
    ///
    /// 三条链路必须互不相同，且不能与任何存活外设共用
    pub fn register(&self, channels: ChannelTriple) -> Result<PeripheralHandle, RegisterError> {
        if !channels.is_distinct() {
            return Err(RegisterError::ChannelInUse);
        }

        let handle = critical_section::with(|cs| {
            let in_use = self.slots.iter().any(|slot| {
                slot.state
                    .borrow(cs)
                    .borrow()
                    .record
                    .as_ref()
                    .is_some_and(|rec| rec.channels.overlaps(&channels))
            });
            if in_use {
                return Err(RegisterError::ChannelInUse);
            }

            for (index, slot) in self.slots.iter().enumerate() {
                let mut state = slot.state.borrow(cs).borrow_mut();
                if state.record.is_none() {
                    state.record = Some(Record {
                        channels,
                        handler: None,
                    });
                    return Ok(PeripheralHandle {
                        slot: index as u8,
                        generation: state.generation,
                    });
                }
            }
            Err(RegisterError::TableFull { capacity: N })
        })?;

        let slot = &self.slots[handle.index()];
        slot.reset_data_path();
        for role in ChannelRole::ALL {
            channels.link(role).clear();
        }

        log_info!("peripheral registered in slot {}", handle.index());
        self.hub_waker.wake();
        Ok(handle)
    }

    /// 注销外设，句柄随即失效
    pub fn deregister(&self, handle: PeripheralHandle) {
        let slot = self.slot(handle);
        let channels = critical_section::with(|cs| {
            let mut state = slot.state.borrow(cs).borrow_mut();
            if state.live(handle.generation).is_none() {
                return None;
            }
            state.generation = state.generation.wrapping_add(1);
            state.record.take().map(|rec| rec.channels)
        });
        let Some(channels) = channels else {
            stale(handle);
        };

        slot.reset_data_path();
        for role in ChannelRole::ALL {
            channels.link(role).clear();
        }
        log_info!("peripheral deregistered from slot {}", handle.index());
        self.hub_waker.wake();
    }

    /// 绑定中断回调与目标核心
    ///
    /// 重复调用时后一次覆盖前一次。`core` 不存在于当前端口时 panic。
    pub fn handler_register(
        &self,
        handle: PeripheralHandle,
        core: CoreId,
        app_data: AppData,
        isr: IsrCallback,
    ) {
        if !core.exists() {
            panic!("core {} does not exist on this port ({} cores)", core.index(), Port::CORES);
        }
        let slot = self.slot(handle);
        let replaced = critical_section::with(|cs| {
            let mut state = slot.state.borrow(cs).borrow_mut();
            if state.generation != handle.generation {
                return None;
            }
            let record = state.record.as_mut()?;
            let previous = record.handler.replace(Handler { core, app_data, isr });
            Some(previous.is_some())
        });
        match replaced {
            None => stale(handle),
            Some(true) => log_warn!(
                "slot {} handler replaced by `{}` on core {}",
                handle.index(),
                isr.name(),
                core.index()
            ),
            Some(false) => log_debug!(
                "slot {} handler `{}` on core {}",
                handle.index(),
                isr.name(),
                core.index()
            ),
        }
    }

    /// 注册时提供的应用上下文，尚未注册回调时为 `None`
    pub fn app_data(&self, handle: PeripheralHandle) -> Option<AppData> {
        self.handler(handle).map(|h| h.app_data)
    }

    /// 通道三元组
    pub fn channels(&self, handle: PeripheralHandle) -> ChannelTriple {
        self.with_live(handle, |rec| rec.channels)
    }

    /// 控制通道的控制方端点
    pub fn ctrl_chanend(&self, handle: PeripheralHandle) -> ControlEnd {
        ControlEnd::new(self.channels(handle).control)
    }

    /// 外设侧通道端点
    pub fn chanend(&self, handle: PeripheralHandle, role: ChannelRole) -> Chanend<'_> {
        let link = self.channels(handle).link(role);
        let slot = &self.slots[handle.index()];
        Chanend::new(role, link, &slot.rx, &slot.tx)
    }

    /// 接收环形队列: Hub 生产，外设消费
    pub fn rx_dma_ring_buf(&self, handle: PeripheralHandle) -> &DmaRing {
        self.with_live(handle, |_| ());
        &self.slots[handle.index()].rx
    }

    /// 发送环形队列: 外设生产，Hub 消费
    pub fn tx_dma_ring_buf(&self, handle: PeripheralHandle) -> &DmaRing {
        self.with_live(handle, |_| ());
        &self.slots[handle.index()].tx
    }

    /// 读取并清除挂起的中断状态位
    ///
    /// 一次原子交换完成，与 Hub 置位互不丢失
    pub fn interrupt_status(&self, handle: PeripheralHandle) -> IrqStatus {
        self.with_live(handle, |_| ());
        IrqStatus::from_bits_retain(self.slots[handle.index()].status.swap(0, Ordering::AcqRel))
    }

    /// 唤醒 Hub: 出现了新的 DMA 机会 (例如引擎空闲)
    pub fn hub_dma_request(&self) {
        self.dma_request.set();
        self.hub_waker.wake();
    }

    // =============================================
    // Hub 与中断路由内部接口
    // =============================================

    pub(crate) fn register_hub_waker(&self, waker: &Waker) {
        self.hub_waker.register(waker);
    }

    pub(crate) fn take_dma_request(&self) -> bool {
        self.dma_request.take()
    }

    /// 槽位上存活外设的句柄与通道
    pub(crate) fn live_slot(&self, index: usize) -> Option<(PeripheralHandle, ChannelTriple)> {
        let slot = self.slots.get(index)?;
        slot.state.lock(|cell| {
            let state = cell.borrow();
            state.record.as_ref().map(|rec| {
                (
                    PeripheralHandle {
                        slot: index as u8,
                        generation: state.generation,
                    },
                    rec.channels,
                )
            })
        })
    }

    pub(crate) fn handler(&self, handle: PeripheralHandle) -> Option<Handler> {
        self.with_live(handle, |rec| rec.handler)
    }

    /// 置位状态并在回调所在核心上挂起中断线
    ///
    /// 中断只能在 `handler_register` 之后触发。Hub 在开始传输前已检查，
    /// 这里仍没有回调说明契约被破坏: 状态位照常锁存，返回 `false`
    pub(crate) fn complete(
        &self,
        handle: PeripheralHandle,
        bits: IrqStatus,
        router: &IrqRouter,
    ) -> bool {
        let handler = self.handler(handle);
        self.slots[handle.index()]
            .status
            .fetch_or(bits.bits(), Ordering::AcqRel);
        match handler {
            Some(h) => {
                router.raise(h.core, handle.index());
                true
            }
            None => {
                log_error!("slot {} completed before handler_register", handle.index());
                crate::debug_assert_msg!(
                    false,
                    "slot {} completed before handler_register",
                    handle.index()
                );
                false
            }
        }
    }

    /// 在 `core` 上执行槽位 `index` 的中断回调
    ///
    /// 回调已被改绑到其他核心时转投过去；槽位已注销时丢弃
    pub(crate) fn deliver_irq(&self, index: usize, core: CoreId, router: &IrqRouter) -> bool {
        let handler = self.slots.get(index).and_then(|slot| {
            slot.state
                .lock(|cell| cell.borrow().record.as_ref().and_then(|rec| rec.handler))
        });
        match handler {
            Some(h) if h.core == core => {
                run_isr(&h.isr, h.app_data);
                true
            }
            Some(h) => {
                router.raise(h.core, index);
                false
            }
            None => false,
        }
    }

    fn slot(&self, handle: PeripheralHandle) -> &Slot {
        match self.slots.get(handle.index()) {
            Some(slot) => slot,
            None => stale(handle),
        }
    }

    fn with_live<R>(&self, handle: PeripheralHandle, f: impl FnOnce(&Record) -> R) -> R {
        let result = self
            .slot(handle)
            .state
            .lock(|cell| cell.borrow().live(handle.generation).map(f));
        match result {
            Some(value) => value,
            None => stale(handle),
        }
    }
}

impl<const N: usize> Default for PeripheralTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cold]
fn stale(handle: PeripheralHandle) -> ! {
    panic!(
        "stale or unregistered peripheral handle (slot {}, generation {})",
        handle.slot, handle.generation
    )
}
