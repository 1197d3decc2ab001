//! ESP32-S3 (Xtensa LX7) 端口
//!
//! - 掩码: PS.INTLEVEL，0 表示全部中断使能
//! - 屏蔽等级取 EXCM 等级 (3)，与 esp-hal 临界区一致，高优先级 NMI 不受影响
//! - 内核态与 KSP 按核心保存在静态表中，核心号取自 `Cpu::current()`

use core::arch::asm;
use core::ffi::c_void;
use core::ptr::NonNull;

use esp_hal::system::Cpu;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use crate::interrupt::hal::{InterruptHal, KernelEntry, KernelStackRef};

const PS_INTLEVEL_MASK: u32 = 0x0F;

const CORE_COUNT: usize = 2;

static KERNEL_MODE: [AtomicBool; CORE_COUNT] = [const { AtomicBool::new(false) }; CORE_COUNT];
static KSP_TOP: [AtomicPtr<u8>; CORE_COUNT] =
    [const { AtomicPtr::new(core::ptr::null_mut()) }; CORE_COUNT];
static KSP_WORDS: [AtomicUsize; CORE_COUNT] = [const { AtomicUsize::new(0) }; CORE_COUNT];

#[inline(always)]
fn core_index() -> usize {
    match Cpu::current() {
        Cpu::ProCpu => 0,
        #[allow(unreachable_patterns)]
        _ => 1,
    }
}

#[inline(always)]
fn read_ps() -> u32 {
    let ps: u32;
    unsafe { asm!("rsr.ps {0}", out(reg) ps, options(nomem, nostack)) };
    ps
}

#[inline(always)]
fn enabled(ps: u32) -> u32 {
    ((ps & PS_INTLEVEL_MASK) == 0) as u32
}

pub struct XtensaPort;

impl InterruptHal for XtensaPort {
    const CORES: usize = CORE_COUNT;

    fn mask_get() -> u32 {
        enabled(read_ps())
    }

    fn mask_all() -> u32 {
        let ps: u32;
        unsafe { asm!("rsil {0}, 3", out(reg) ps, options(nostack)) };
        enabled(ps)
    }

    fn unmask_all() {
        let _ps: u32;
        unsafe { asm!("rsil {0}, 0", out(reg) _ps, options(nostack)) };
    }

    fn isr_running() -> bool {
        KERNEL_MODE[core_index()].load(Ordering::Acquire)
    }
}

unsafe impl KernelEntry for XtensaPort {
    fn kernel_stack() -> Option<KernelStackRef> {
        let core = core_index();
        let top = NonNull::new(KSP_TOP[core].load(Ordering::Acquire))?;
        Some(KernelStackRef {
            top,
            words: KSP_WORDS[core].load(Ordering::Acquire),
        })
    }

    unsafe fn set_kernel_stack(stack: Option<KernelStackRef>) {
        let core = core_index();
        match stack {
            Some(stack) => {
                KSP_WORDS[core].store(stack.words, Ordering::Release);
                KSP_TOP[core].store(stack.top.as_ptr(), Ordering::Release);
            }
            None => {
                KSP_TOP[core].store(core::ptr::null_mut(), Ordering::Release);
                KSP_WORDS[core].store(0, Ordering::Release);
            }
        }
    }

    unsafe fn kernel_enter() {
        KERNEL_MODE[core_index()].store(true, Ordering::Release);
    }

    unsafe fn kernel_exit() {
        KERNEL_MODE[core_index()].store(false, Ordering::Release);
    }

    unsafe fn call_on_stack(

        top: NonNull<u8>,

        f: unsafe extern "C" fn(*mut c_void),

        arg: *mut c_void,

    ) {
        // 窗口 ABI: 旧 a1 存在新栈的保留区，movsp 触发的 alloca 异常负责溢出寄存器窗口；
        // callx8 之后 a8..a15 全部失效，因此旧 a1 从栈上重新读回
        asm!(
            "addi {frame}, {top}, -16",
            "s32i a1, {frame}, 0",
            "movsp a1, {frame}",
            "callx8 {f}",
            "l32i {frame}, a1, 0",
            "movsp a1, {frame}",
            top = in(reg) top.as_ptr(),
            f = in(reg) f,
            frame = out(reg) _,
            inout("a10") arg => _,
            out("a8") _,
            out("a9") _,
            out("a11") _,
            out("a12") _,
            out("a13") _,
            out("a14") _,
            out("a15") _,
        );
    }
}
