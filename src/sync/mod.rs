//! 同步原语模块
//!
//! 提供线程安全的同步原语，基于 embassy-sync 封装:
//! - `CriticalSignal`: 单值信号量
//! - `CriticalChannel`: 固定容量消息队列
//! - `CriticalLock`: 临界区阻塞锁
//! - `RingBuffer`: SPSC 环形队列

pub mod primitives;
pub mod ringbuffer;

pub use primitives::{AtomicCounter, AtomicFlag, CriticalChannel, CriticalLock, CriticalSignal};
pub use ringbuffer::RingBuffer;
