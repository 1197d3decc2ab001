//! 外设子系统
//!
//! - `registry`: 外设注册表与句柄
//! - `channel`: 三通道握手协议与外设侧 API
//! - `hub`: 独占 DMA 引擎的调度循环
//! - `status`: 中断状态位
//! - `devices`: 板级设备表

pub mod channel;
pub mod devices;
pub mod hub;
pub mod registry;
pub mod status;

pub use channel::{
    raise_irq, recv_command, rx_dma_ready, rx_dma_xfer, send_reply, tx_dma_xfer, ChannelLink,
    ChannelRole, ChannelTriple, Chanend, ControlEnd, DmaRing, Message,
};
pub use devices::{DeviceClass, DeviceSet, BOARD_DEVICE_COUNT};
pub use hub::{
    hub, DmaEngine, Fairness, HubConfig, HubStats, PeripheralHub, Source, ViolationPolicy,
};
pub use registry::{PeripheralHandle, PeripheralTable};
pub use status::IrqStatus;
