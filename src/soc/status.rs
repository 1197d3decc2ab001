//! 外设中断状态位
//!
//! 位 0 为接收完成，位 1 为发送完成，其余位保留给设备自定义事件
//! (通过控制通道的 `Irq` 消息置位)。

use bitflags::bitflags;

bitflags! {
    /// 外设中断状态位图
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IrqStatus: u32 {
        /// DMA 接收完成
        const DMA_RX_DONE = 1 << 0;
        /// DMA 发送完成
        const DMA_TX_DONE = 1 << 1;
        // 保留位原样保存
        const _ = !0;
    }
}

impl IrqStatus {
    /// 设备自定义位 (保留区)
    pub const fn device_bits(self) -> u32 {
        self.bits() & !(Self::DMA_RX_DONE.bits() | Self::DMA_TX_DONE.bits())
    }
}
