//! 同步原语封装
//!
//! 基于 embassy-sync 提供的同步原语，统一使用 CriticalSectionRawMutex
//! 以确保在多核、多执行上下文环境下的正确性

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    channel::Channel,
    signal::Signal,
};

// ===== 类型别名: 简化使用 =====

/// 临界区信号量 - 用于任务间单值通知
///
/// 发送方可以发送一个值，接收方异步等待
/// 多次发送只保留最后一个值
///
/// # Example
/// ```ignore
/// static SIGNAL: CriticalSignal<u32> = CriticalSignal::new();
///
/// // 发送方
/// SIGNAL.signal(42);
///
/// // 接收方 (异步)
/// let value = SIGNAL.wait().await;
/// ```
pub type CriticalSignal<T> = Signal<CriticalSectionRawMutex, T>;

/// 临界区通道 - 固定容量消息队列
///
/// 外设通道的每个方向都是一个容量为 1 的 `CriticalChannel`，
/// 配合请求-应答握手即得到同步通道语义
///
/// # Example
/// ```ignore
/// static CHANNEL: CriticalChannel<Message, 1> = CriticalChannel::new();
///
/// // 发送方 (异步，队列满时等待)
/// CHANNEL.send(Message::RxReady).await;
///
/// // 接收方 (异步)
/// let msg = CHANNEL.receive().await;
/// ```
pub type CriticalChannel<T, const N: usize> = Channel<CriticalSectionRawMutex, T, N>;

/// 临界区阻塞锁 - 保护极短的共享状态访问
///
/// 锁内禁止 await，也禁止调用中断回调
pub type CriticalLock<T> = Mutex<CriticalSectionRawMutex, T>;

// ===== 优化的原子操作封装 =====

use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// 原子标志 - 最快的任务间通知
///
/// 比 Signal 更轻量，适用于简单的布尔状态通知
pub struct AtomicFlag {
    flag: AtomicBool,
}

impl AtomicFlag {
    /// 创建新的原子标志
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// 设置标志
    #[inline(always)]
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// 检查并清除标志 (test-and-clear)
    #[inline(always)]
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// 原子计数器 - 用于统计
pub struct AtomicCounter {
    count: AtomicU64,
}

impl AtomicCounter {
    /// 创建新的计数器
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// 增加并返回新值
    #[inline(always)]
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 增加指定值并返回新值
    #[inline(always)]
    pub fn add(&self, value: u64) -> u64 {
        self.count.fetch_add(value, Ordering::Relaxed) + value
    }

    /// 获取当前值
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_take_clears() {
        let flag = AtomicFlag::new();
        assert!(!flag.take());
        flag.set();
        flag.set();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_counter_add() {
        let counter = AtomicCounter::new();
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.add(9), 10);
        assert_eq!(counter.get(), 10);
    }
}
