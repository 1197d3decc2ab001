//! 中断硬件抽象
//!
//! 可移植逻辑只依赖这里的两个 trait，从不直接接触寄存器编码:
//! - [`InterruptHal`]: 核心数、掩码读写与内核态查询
//! - [`KernelEntry`]: 内核栈指针、内核态进出、在指定栈上调用函数

use core::ffi::c_void;
use core::ptr::NonNull;

/// 每个执行上下文的中断掩码控制
///
/// 掩码非零表示中断已使能。所有操作只影响调用者所在的执行上下文。
pub trait InterruptHal {
    /// 端口上存在的核心 (执行上下文) 数
    const CORES: usize;

    /// 读取当前掩码，无副作用
    fn mask_get() -> u32;

    /// 原子地屏蔽全部中断，返回调用前的掩码
    fn mask_all() -> u32;

    /// 原子地使能全部中断
    fn unmask_all();

    /// 是否处于内核态 (中断服务或内核调用中)，与掩码无关
    fn isr_running() -> bool;
}

/// 已安装的内核栈描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStackRef {
    /// 栈顶 (高地址，16 字节对齐)
    pub top: NonNull<u8>,
    /// 可用字数
    pub words: usize,
}

/// 内核栈与内核态切换
///
/// # Safety
/// 实现者必须保证 `call_on_stack` 在返回前恢复调用者的栈指针，
/// 且 `kernel_enter`/`kernel_exit` 只修改当前执行上下文的状态。
pub unsafe trait KernelEntry {
    /// 当前执行上下文安装的内核栈 (KSP)
    fn kernel_stack() -> Option<KernelStackRef>;

    /// 安装或撤销内核栈
    ///
    /// # Safety
    /// 被安装的栈在撤销前必须保持有效且不被移动
    unsafe fn set_kernel_stack(stack: Option<KernelStackRef>);

    /// 进入内核态
    ///
    /// # Safety
    /// 只能由中断分发路径调用，且必须与 `kernel_exit` 成对
    unsafe fn kernel_enter();

    /// 离开内核态
    ///
    /// # Safety
    /// 见 `kernel_enter`
    unsafe fn kernel_exit();

    /// 切换到 `top` 指向的栈上调用 `f(arg)`，返回后恢复原栈
    ///
    /// # Safety
    /// `top` 必须指向一块足够容纳 `f` 最坏调用深度的有效栈顶，
    /// `f` 不得 unwind
    unsafe fn call_on_stack(
        top: NonNull<u8>,
        f: unsafe extern "C" fn(*mut c_void),
        arg: *mut c_void,
    );
}
