//! 内核栈与中断许可作用域
//!
//! 中断回调不使用被打断任务的栈，而是运行在一块每个执行上下文私有的内核栈上。
//! [`InterruptPermitted`] 把一个长期运行的入口 (通常是调度器或事件循环)
//! 包装成两个入口:
//!
//! - [`InterruptPermitted::call`]: 普通调用，不安装内核栈
//! - [`InterruptPermitted::call_interrupt_permitted`]: 先安装内核栈再调用，
//!   返回后内核栈失效
//!
//! # 示例
//!
//! ```rust,ignore
//! const WORDS: usize = isr_group_words(&[MIC_ISR, GPIO_ISR]);
//!
//! static ROOT: StaticCell<InterruptPermitted<fn() -> !, WORDS>> = StaticCell::new();
//! let root = ROOT.init(InterruptPermitted::new(scheduler_main));
//! root.call_interrupt_permitted();
//! ```

use core::cell::UnsafeCell;
use core::mem::size_of;
use core::ptr::NonNull;

use super::hal::{InterruptHal, KernelEntry, KernelStackRef};
use super::port::Port;

/// 栈填充图案，用于统计高水位
const PAINT: usize = usize::from_ne_bytes([0xA5; size_of::<usize>()]);

/// 栈顶对齐 (字节)
const STACK_ALIGN: usize = 16;

/// 静态分配的内核栈
#[repr(C, align(16))]
pub struct KernelStack<const WORDS: usize> {
    words: UnsafeCell<[usize; WORDS]>,
}

// Safety: 内核栈只被安装它的执行上下文使用
unsafe impl<const WORDS: usize> Sync for KernelStack<WORDS> {}

impl<const WORDS: usize> KernelStack<WORDS> {
    /// 创建已填充的内核栈
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([PAINT; WORDS]),
        }
    }

    /// 容量 (字)
    pub const fn capacity(&self) -> usize {
        WORDS
    }

    /// 栈描述: 栈顶向下对齐到 16 字节
    pub fn stack_ref(&self) -> KernelStackRef {
        let usable = (WORDS * size_of::<usize>()) & !(STACK_ALIGN - 1);
        let base = NonNull::from(&self.words).cast::<u8>();
        KernelStackRef {
            // Safety: usable 不超过数组字节数
            top: unsafe { base.add(usable) },
            words: usable / size_of::<usize>(),
        }
    }

    /// 历史最深用量 (字)
    ///
    /// 栈向低地址增长，从底部数仍保持填充图案的字即可。
    /// 只应在内核栈未被使用时调用。
    pub fn high_water_words(&self) -> usize {
        let base = self.words.get() as *const usize;
        let untouched = (0..WORDS)
            .take_while(|&i| unsafe { core::ptr::read_volatile(base.add(i)) } == PAINT)
            .count();
        WORDS - untouched
    }

    /// 重新填充，清除高水位记录
    pub fn repaint(&mut self) {
        self.words.get_mut().fill(PAINT);
    }
}

impl<const WORDS: usize> Default for KernelStack<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

/// 作用域结束 (包括 unwind) 时恢复之前的 KSP
struct KspRestore(Option<KernelStackRef>);

impl Drop for KspRestore {
    fn drop(&mut self) {
        unsafe { Port::set_kernel_stack(self.0) };
    }
}

/// 中断许可入口
///
/// 拥有入口函数与一块 `WORDS` 字的内核栈。`WORDS` 通常取自
/// [`isr_group_words`](super::isr_group_words)。
pub struct InterruptPermitted<F, const WORDS: usize> {
    body: F,
    stack: KernelStack<WORDS>,
}

impl<F, R, const WORDS: usize> InterruptPermitted<F, WORDS>
where
    F: FnMut() -> R,
{
    pub const fn new(body: F) -> Self {
        Self {
            body,
            stack: KernelStack::new(),
        }
    }

    /// 普通入口: 直接调用，不安装内核栈
    pub fn call(&mut self) -> R {
        (self.body)()
    }

    /// 中断许可入口: 安装内核栈后调用
    ///
    /// 返回后内核栈与 KSP 状态失效，之前的 KSP (如有) 被恢复。
    /// 不得在内核态中调用。
    pub fn call_interrupt_permitted(&mut self) -> R {
        crate::debug_assert_msg!(
            !Port::isr_running(),
            "interrupt-permitted entry called from kernel mode"
        );
        let stack = self.stack.stack_ref();
        let _restore = KspRestore(Port::kernel_stack());
        unsafe { Port::set_kernel_stack(Some(stack)) };
        (self.body)()
    }

    pub fn kernel_stack(&self) -> &KernelStack<WORDS> {
        &self.stack
    }
}
