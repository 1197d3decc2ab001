//! 板级设备表
//!
//! micarray 板上每类设备的实例数。注册表容量取这些数之和，
//! 每类设备的句柄收在一个 [`DeviceSet`] 里，按设备序号 (A, B, ...) 索引。

use heapless::Vec;

use crate::error::RegisterError;
use crate::soc::channel::ChannelTriple;
use crate::soc::registry::{PeripheralHandle, PeripheralTable};

pub const MICARRAY_DEVICE_COUNT: usize = 1;
pub const ETHERNET_DEVICE_COUNT: usize = 1;
pub const I2S_DEVICE_COUNT: usize = 1;
pub const I2C_DEVICE_COUNT: usize = 1;
pub const GPIO_DEVICE_COUNT: usize = 2;

/// 全板设备总数，即注册表容量
pub const BOARD_DEVICE_COUNT: usize = MICARRAY_DEVICE_COUNT
    + ETHERNET_DEVICE_COUNT
    + I2S_DEVICE_COUNT
    + I2C_DEVICE_COUNT
    + GPIO_DEVICE_COUNT;

/// 设备类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    MicArray,
    Ethernet,
    I2s,
    I2c,
    Gpio,
}

impl DeviceClass {
    pub const ALL: [Self; 5] = [Self::MicArray, Self::Ethernet, Self::I2s, Self::I2c, Self::Gpio];

    /// 本板该类设备的实例数
    pub const fn count(self) -> usize {
        match self {
            Self::MicArray => MICARRAY_DEVICE_COUNT,
            Self::Ethernet => ETHERNET_DEVICE_COUNT,
            Self::I2s => I2S_DEVICE_COUNT,
            Self::I2c => I2C_DEVICE_COUNT,
            Self::Gpio => GPIO_DEVICE_COUNT,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::MicArray => "micarray",
            Self::Ethernet => "ethernet",
            Self::I2s => "i2s",
            Self::I2c => "i2c",
            Self::Gpio => "gpio",
        }
    }
}

/// 一类设备的句柄集合
#[derive(Debug)]
pub struct DeviceSet<const N: usize> {
    class: DeviceClass,
    handles: Vec<PeripheralHandle, N>,
}

impl<const N: usize> DeviceSet<N> {
    pub const fn new(class: DeviceClass) -> Self {
        Self {
            class,
            handles: Vec::new(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// 注册下一个设备实例
    ///
    /// 集合已满 (超出本类设备数) 或注册表已满时返回 `TableFull`
    pub fn register<const T: usize>(
        &mut self,
        table: &PeripheralTable<T>,
        channels: ChannelTriple,
    ) -> Result<PeripheralHandle, RegisterError> {
        if self.handles.is_full() {
            return Err(RegisterError::TableFull { capacity: N });
        }
        let handle = table.register(channels)?;
        // 上面检查过未满
        let _ = self.handles.push(handle);
        crate::log_info!("{} device {} registered", self.class.name(), self.handles.len() - 1);
        Ok(handle)
    }

    /// 第 `index` 个设备 (A = 0)
    pub fn get(&self, index: usize) -> Option<PeripheralHandle> {
        self.handles.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = PeripheralHandle> + '_ {
        self.handles.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::channel::ChannelLink;

    #[test]
    fn test_board_totals() {
        assert_eq!(BOARD_DEVICE_COUNT, 6);
        let sum: usize = DeviceClass::ALL.iter().map(|c| c.count()).sum();
        assert_eq!(sum, BOARD_DEVICE_COUNT);
    }

    #[test]
    fn test_set_bounded_by_class_count() {
        static L: [ChannelLink; 9] = [const { ChannelLink::new() }; 9];
        let table = PeripheralTable::<BOARD_DEVICE_COUNT>::new();
        let mut gpio = DeviceSet::<GPIO_DEVICE_COUNT>::new(DeviceClass::Gpio);

        let a = gpio.register(&table, ChannelTriple::new(&L[0], &L[1], &L[2])).unwrap();
        let b = gpio.register(&table, ChannelTriple::new(&L[3], &L[4], &L[5])).unwrap();
        assert_eq!(
            gpio.register(&table, ChannelTriple::new(&L[6], &L[7], &L[8])),
            Err(RegisterError::TableFull { capacity: 2 })
        );
        assert_eq!(gpio.get(0), Some(a));
        assert_eq!(gpio.get(1), Some(b));
        assert_eq!(table.len(), 2);
    }
}
