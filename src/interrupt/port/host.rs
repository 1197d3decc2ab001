//! 主机端口
//!
//! 每个 OS 线程扮演一个硬件执行上下文: 掩码、内核态标志和 KSP 都是线程局部的。
//! 复位状态与硬件一致: 中断屏蔽、不在内核态、未安装内核栈。
//!
//! x86_64 与 aarch64 (System V / AAPCS) 上 `call_on_stack` 真正切换栈指针；
//! 其他平台退化为在当前栈上直接调用。

use core::cell::Cell;
use core::ffi::c_void;
use core::ptr::NonNull;

use crate::interrupt::hal::{InterruptHal, KernelEntry, KernelStackRef};

std::thread_local! {
    static MASK: Cell<u32> = const { Cell::new(0) };
    static KERNEL_MODE: Cell<bool> = const { Cell::new(false) };
    static KSP: Cell<Option<KernelStackRef>> = const { Cell::new(None) };
}

/// 掩码寄存器中的使能位
const IEBLE: u32 = 1;

/// 用线程模拟的核心数
const HOST_CORES: usize = 4;

pub struct HostPort;

impl InterruptHal for HostPort {
    const CORES: usize = HOST_CORES;

    fn mask_get() -> u32 {
        MASK.with(Cell::get)
    }

    fn mask_all() -> u32 {
        MASK.with(|mask| mask.replace(0))
    }

    fn unmask_all() {
        MASK.with(|mask| mask.set(IEBLE));
    }

    fn isr_running() -> bool {
        KERNEL_MODE.with(Cell::get)
    }
}

unsafe impl KernelEntry for HostPort {
    fn kernel_stack() -> Option<KernelStackRef> {
        KSP.with(Cell::get)
    }

    unsafe fn set_kernel_stack(stack: Option<KernelStackRef>) {
        KSP.with(|ksp| ksp.set(stack));
    }

    unsafe fn kernel_enter() {
        KERNEL_MODE.with(|mode| mode.set(true));
    }

    unsafe fn kernel_exit() {
        KERNEL_MODE.with(|mode| mode.set(false));
    }

    #[cfg(all(target_arch = "x86_64", not(windows)))]
    unsafe fn call_on_stack(
        top: NonNull<u8>,
        f: unsafe extern "C" fn(*mut c_void),
        arg: *mut c_void,
    ) {
        // 旧 rsp 压在新栈顶，call 前保持 16 字节对齐
        core::arch::asm!(
            "mov r12, rsp",
            "mov rsp, {top}",
            "push r12",
            "sub rsp, 8",
            "call {f}",
            "add rsp, 8",
            "pop rsp",
            top = in(reg) top.as_ptr(),
            f = in(reg) f,
            in("rdi") arg,
            out("r12") _,
            clobber_abi("C"),
        );
    }

    #[cfg(all(target_arch = "aarch64", not(windows)))]
    unsafe fn call_on_stack(
        top: NonNull<u8>,
        f: unsafe extern "C" fn(*mut c_void),
        arg: *mut c_void,
    ) {
        // x19 由 LLVM 保留，旧 sp 放在 x20 并同时压入新栈
        core::arch::asm!(
            "mov x20, sp",
            "mov sp, {top}",
            "str x20, [sp, #-16]!",
            "blr {f}",
            "ldr x21, [sp], #16",
            "mov sp, x21",
            top = in(reg) top.as_ptr(),
            f = in(reg) f,
            in("x0") arg,
            out("x20") _,
            out("x21") _,
            clobber_abi("C"),
        );
    }

    #[cfg(any(windows, not(any(target_arch = "x86_64", target_arch = "aarch64"))))]
    unsafe fn call_on_stack(
        _top: NonNull<u8>,
        f: unsafe extern "C" fn(*mut c_void),
        arg: *mut c_void,
    ) {
        f(arg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicUsize, Ordering};

    static SP: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn record_sp(arg: *mut c_void) {
        let marker = 0u8;
        SP.store(core::hint::black_box(&marker) as *const u8 as usize, Ordering::SeqCst);
        *(arg as *mut u32) = 7;
    }

    #[repr(C, align(16))]
    struct Stack([u8; 8192]);

    #[test]
    fn test_call_on_stack_runs_on_given_stack() {
        let mut stack = Stack([0; 8192]);
        let base = stack.0.as_ptr() as usize;
        let top = NonNull::from(&mut stack).cast::<u8>();
        // Safety: 8192 字节都在 `stack` 内
        let top = unsafe { top.add(8192) };

        let mut out = 0u32;
        unsafe { HostPort::call_on_stack(top, record_sp, &mut out as *mut u32 as *mut c_void) };
        assert_eq!(out, 7);

        let sp = SP.load(Ordering::SeqCst);
        if cfg!(all(any(target_arch = "x86_64", target_arch = "aarch64"), not(windows))) {
            assert!(sp > base && sp < base + 8192, "callback ran at {:#x}", sp);
        }
    }

    #[test]
    fn test_reset_state_is_masked_user_mode() {
        assert_eq!(HostPort::mask_get(), 0);
        assert!(!HostPort::isr_running());
        assert!(HostPort::kernel_stack().is_none());
    }
}
