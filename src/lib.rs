//! soc-hub - 多核嵌入式 RTOS 的外设 I/O 核心
//!
//! 本库提供以下核心功能:
//! - 中断核心: 每执行上下文的掩码控制、私有内核栈上的中断回调
//! - 外设注册表: 生代检查的不透明句柄
//! - 外设 Hub: 独占共享 DMA 引擎，在所有外设之间仲裁
//! - DMA 环形队列: 每外设一收一发的 SPSC 帧队列
//! - 条件编译日志系统

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(feature = "esp32s3", feature(asm_experimental_arch))]

pub mod error;
pub mod interrupt;
pub mod mem;
pub mod soc;
pub mod sync;
pub mod util;

// ===== 重导出常用类型 =====
pub use error::{EngineBusy, RegisterError, XferError};
pub use interrupt::{
    isr_running, mask_all, mask_get, mask_set, unmask_all, AppData, CoreId, InterruptMask,
    InterruptPermitted, IrqRouter, IsrCallback, MaskGuard,
};
pub use soc::{
    hub, rx_dma_ready, rx_dma_xfer, tx_dma_xfer, ChannelLink, ChannelRole, ChannelTriple, DmaEngine,
    HubConfig, IrqStatus, PeripheralHandle, PeripheralHub, PeripheralTable,
};
pub use sync::ringbuffer::RingBuffer;

// ===== 版本信息 =====
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 系统配置常量
pub mod config {
    /// 支持的最大核心数 (每核一条中断线)
    pub const MAX_CORES: usize = 8;

    /// 每个外设的通道数: FROM_DMA, TO_DMA, CONTROL
    pub const CHANNEL_COUNT: usize = 3;

    /// 单个 DMA 帧的最大字节数
    pub const DMA_FRAME_SIZE: usize = 512;

    /// 每个方向的 DMA 环形队列深度 (必须是 2 的幂)
    pub const DMA_RING_DEPTH: usize = 4;

    /// 中断分发路径本身的内核栈开销 (字)
    pub const KSTACK_OVERHEAD_WORDS: usize = 64;

    /// 内核栈下限 (字)
    ///
    /// 构建时由环境变量 `SOC_HUB_KSTACK_WORDS` 指定，默认 0
    pub const KSTACK_MIN_WORDS: usize = parse_words(env!("SOC_HUB_KSTACK_WORDS"));

    const fn parse_words(s: &str) -> usize {
        let bytes = s.as_bytes();
        let mut value = 0;
        let mut i = 0;
        while i < bytes.len() {
            let digit = bytes[i];
            assert!(digit.is_ascii_digit(), "SOC_HUB_KSTACK_WORDS must be a decimal number");
            value = value * 10 + (digit - b'0') as usize;
            i += 1;
        }
        value
    }
}
