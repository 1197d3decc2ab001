//! 中断核心
//!
//! 给中断回调提供私有、有界的内核栈，并提供可组合的原子掩码控制。
//!
//! # 掩码约定
//!
//! - 掩码非零表示中断使能
//! - [`mask_all`] 屏蔽并返回保存点 [`MaskGuard`]，保存点被消费时恢复原状态
//! - [`mask_set`] 只会 *使能*: 非零值等价于 [`unmask_all`]，零值什么都不做。
//!   屏蔽只能通过 [`mask_all`]
//!
//! # 内核栈不可重入
//!
//! 回调在内核栈上执行期间中断保持屏蔽。回调自身不得在内核态解除屏蔽，
//! 否则嵌套中断会覆盖同一块内核栈。运行时无法廉价地阻止这一点，
//! debug 构建下以断言报告。
//!
//! # 示例
//!
//! ```rust,ignore
//! use soc_hub::interrupt;
//!
//! let saved = interrupt::mask_all();
//! // ... 临界操作 ...
//! saved.restore();
//! ```

pub mod callback;
pub mod hal;
pub mod kstack;
pub mod multicore;
mod port;

use core::ffi::c_void;
use core::marker::PhantomData;

pub use callback::{isr_group_words, AppData, IsrCallback};
pub use hal::{InterruptHal, KernelEntry, KernelStackRef};
pub use kstack::{InterruptPermitted, KernelStack};
pub use multicore::{CoreId, IrqRouter};
pub use port::Port;

/// 中断掩码值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptMask(u32);

impl InterruptMask {
    /// 全部屏蔽
    pub const MASKED: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_enabled(self) -> bool {
        self.0 != 0
    }
}

/// 读取当前掩码，无副作用
#[inline]
pub fn mask_get() -> InterruptMask {
    InterruptMask(Port::mask_get())
}

/// 屏蔽当前执行上下文的全部中断
///
/// 返回的保存点记录调用前的掩码，`restore` 或 drop 时恢复。
/// 嵌套使用时按栈顺序恢复即可精确还原每一层的状态。
#[inline]
#[must_use = "dropping the guard immediately restores the previous mask"]
pub fn mask_all() -> MaskGuard {
    MaskGuard {
        saved: InterruptMask(Port::mask_all()),
        _not_send: PhantomData,
    }
}

/// 无条件使能当前执行上下文的全部中断
#[inline]
pub fn unmask_all() {
    crate::debug_assert_msg!(
        !isr_running(),
        "interrupts unmasked in kernel mode; the kernel stack is not re-entrant"
    );
    Port::unmask_all();
}

/// 按保存的掩码恢复
///
/// 非零值使能中断；零值是空操作，*不会* 屏蔽中断
#[inline]
pub fn mask_set(mask: InterruptMask) {
    if mask.is_enabled() {
        unmask_all();
    }
}

/// 是否处于内核态 (中断回调或内核调用中)，与掩码无关
#[inline]
pub fn isr_running() -> bool {
    Port::isr_running()
}

/// `mask_all` 返回的保存点
///
/// 不可跨执行上下文传递: 掩码是每个上下文私有的硬件状态
pub struct MaskGuard {
    saved: InterruptMask,
    _not_send: PhantomData<*const ()>,
}

impl MaskGuard {
    /// 保存的掩码
    pub fn saved(&self) -> InterruptMask {
        self.saved
    }

    /// 恢复保存的掩码并消费保存点
    pub fn restore(self) {
        // 由 Drop 完成
    }

    /// 放弃自动恢复，取出原始掩码，由调用方稍后交给 `mask_set`
    pub fn into_mask(self) -> InterruptMask {
        let saved = self.saved;
        core::mem::forget(self);
        saved
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        mask_set(self.saved);
    }
}

struct IsrFrame {
    isr: IsrCallback,
    data: AppData,
}

unsafe extern "C" fn isr_trampoline(arg: *mut c_void) {
    let frame = &*(arg as *const IsrFrame);
    frame.isr.call(frame.data);
}

/// 在当前执行上下文的内核栈上运行一个中断回调
///
/// 流程与硬件中断进入一致: 屏蔽 → 进入内核态 → 切到内核栈 → 回调 →
/// 离开内核态 → 恢复掩码。
///
/// # Panics
/// - 当前上下文没有处于中断许可作用域 (未安装内核栈)
/// - 回调声明的栈用量超过已安装的内核栈
/// - (debug) 在内核态中再次进入，即内核栈重入
pub fn run_isr(isr: &IsrCallback, data: AppData) {
    let Some(kstack) = Port::kernel_stack() else {
        panic!("interrupt callback `{}` raised outside an interrupt-permitted scope", isr.name());
    };
    assert!(
        isr.stack_words() <= kstack.words,
        "interrupt callback `{}` needs {} kernel stack words, only {} installed",
        isr.name(),
        isr.stack_words(),
        kstack.words
    );
    crate::debug_assert_msg!(!isr_running(), "kernel stack re-entered by `{}`", isr.name());

    let saved = mask_all();
    let mut frame = IsrFrame { isr: *isr, data };
    unsafe {
        Port::kernel_enter();
        Port::call_on_stack(kstack.top, isr_trampoline, &mut frame as *mut IsrFrame as *mut c_void);
        Port::kernel_exit();
    }
    saved.restore();
}
