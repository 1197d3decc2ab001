//! 多核中断路由
//!
//! 每个核心一条 "中断线": 一个按外设槽位编号的挂起位字加一个唤醒器。
//! Hub 在传输完成时调用 [`IrqRouter::raise`] 把外设的中断投递到
//! `handler_register` 指定的核心；该核心上的服务任务通过
//! [`IrqRouter::wait`] 等待，再用 [`IrqRouter::service`] 在内核栈上执行回调。
//!
//! # 示例
//!
//! ```rust,ignore
//! static ROUTER: IrqRouter = IrqRouter::new();
//!
//! // 目标核心上的中断服务循环 (运行在中断许可作用域内)
//! loop {
//!     ROUTER.wait(CoreId::CORE1).await;
//!     ROUTER.service(CoreId::CORE1, &TABLE);
//! }
//! ```

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;
use portable_atomic::{AtomicU32, Ordering};

use super::hal::InterruptHal;
use super::port::Port;
use crate::config::MAX_CORES;
use crate::soc::registry::PeripheralTable;

const _: () = assert!(Port::CORES <= MAX_CORES, "port has more cores than interrupt lines");

/// CPU 核心标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(u8);

impl CoreId {
    /// Core0 (PRO_CPU) - 主核心
    pub const CORE0: Self = Self(0);
    /// Core1 (APP_CPU) - 应用核心
    pub const CORE1: Self = Self(1);

    /// 从编号创建，超出 `MAX_CORES` 返回 `None`
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_CORES {
            Some(Self(index))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 当前端口上是否存在该核心
    ///
    /// `MAX_CORES` 只是中断线数量的上限，具体芯片的核心数更少
    pub fn exists(self) -> bool {
        self.index() < Port::CORES
    }

    /// 获取当前运行的核心
    #[cfg(feature = "esp32s3")]
    pub fn current() -> Self {
        match esp_hal::system::Cpu::current() {
            esp_hal::system::Cpu::ProCpu => Self::CORE0,
            #[allow(unreachable_patterns)]
            _ => Self::CORE1,
        }
    }
}

struct CoreLine {
    /// 挂起的外设槽位位图
    pending: AtomicU32,
    waker: AtomicWaker,
}

impl CoreLine {
    const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            waker: AtomicWaker::new(),
        }
    }
}

/// 每核中断线集合
pub struct IrqRouter {
    lines: [CoreLine; MAX_CORES],
}

impl IrqRouter {
    pub const fn new() -> Self {
        Self {
            lines: [const { CoreLine::new() }; MAX_CORES],
        }
    }

    /// 在目标核心上挂起槽位 `slot` 的中断线
    pub fn raise(&self, core: CoreId, slot: usize) {
        debug_assert!(slot < 32);
        let line = &self.lines[core.index()];
        line.pending.fetch_or(1 << slot, Ordering::AcqRel);
        line.waker.wake();
    }

    /// 目标核心上的挂起位图 (不清除)
    pub fn pending(&self, core: CoreId) -> u32 {
        self.lines[core.index()].pending.load(Ordering::Acquire)
    }

    /// 等待目标核心出现挂起中断线，返回挂起位图 (不清除)
    pub async fn wait(&self, core: CoreId) -> u32 {
        let line = &self.lines[core.index()];
        poll_fn(|cx| {
            line.waker.register(cx.waker());
            match line.pending.load(Ordering::Acquire) {
                0 => Poll::Pending,
                bits => Poll::Ready(bits),
            }
        })
        .await
    }

    /// 在调用者所在的核心上投递挂起的中断
    ///
    /// 必须在目标核心的中断许可作用域内调用。调用者处于屏蔽状态时不投递，
    /// 中断线保持挂起。返回执行的回调数。
    pub fn service<const N: usize>(&self, core: CoreId, table: &PeripheralTable<N>) -> usize {
        if !super::mask_get().is_enabled() {
            return 0;
        }
        let mut bits = self.lines[core.index()].pending.swap(0, Ordering::AcqRel);
        let mut delivered = 0;
        while bits != 0 {
            let slot = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            if table.deliver_irq(slot, core, self) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Default for IrqRouter {
    fn default() -> Self {
        Self::new()
    }
}
