//! 单生产者单消费者 (SPSC) 环形队列
//!
//! DMA 数据通路的存储层: 每个外设一收一发两个实例。
//! 特点:
//! - 无锁实现 (使用原子操作)，队列本身从不阻塞
//! - 元素按值移入移出，支持非 `Copy` 的帧类型
//! - 缓存友好的内存布局
//! - 编译时确定容量
//!
//! "谁此刻可以碰队列" 由上层通道握手协议保证；
//! 本类型只要求同一时刻至多一个生产者、一个消费者。

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use portable_atomic::{AtomicUsize, Ordering};

/// SPSC 环形队列
///
/// # Type Parameters
/// * `T` - 元素类型
/// * `N` - 容量 (必须是 2 的幂以优化取模运算)
///
/// # Example
/// ```ignore
/// static QUEUE: RingBuffer<DmaFrame, 4> = RingBuffer::new();
///
/// // 生产者
/// QUEUE.push(frame).ok();
///
/// // 消费者
/// while let Some(frame) = QUEUE.pop() {
///     process(frame);
/// }
/// ```
#[repr(C, align(32))] // 缓存行对齐
pub struct RingBuffer<T, const N: usize> {
    /// 数据存储
    buffer: UnsafeCell<[MaybeUninit<T>; N]>,
    /// 写入位置 (仅生产者更新)
    head: AtomicUsize,
    /// 读取位置 (仅消费者更新)
    tail: AtomicUsize,
}

// Safety: head/tail 的 Acquire/Release 配对保证元素在发布后才可见，
// 生产者与消费者永远不会同时访问同一个槽位
unsafe impl<T: Send, const N: usize> Send for RingBuffer<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T, const N: usize> RingBuffer<T, N> {
    /// 创建新的空队列
    ///
    /// # Panics
    /// 编译时检查 N 必须是 2 的幂
    pub const fn new() -> Self {
        assert!(N > 0 && (N & (N - 1)) == 0, "N must be a power of 2");

        Self {
            buffer: UnsafeCell::new([const { MaybeUninit::uninit() }; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// 队列容量
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// 当前元素数量
    #[inline(always)]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// 掩码 (用于快速取模)
    #[inline(always)]
    const fn mask(&self) -> usize {
        N - 1
    }

    #[inline(always)]
    fn slot(&self, pos: usize) -> *mut MaybeUninit<T> {
        // Safety: 下标已经过掩码，必在数组范围内
        unsafe { (*self.buffer.get()).as_mut_ptr().add(pos & self.mask()) }
    }

    /// 入队 (生产者)
    ///
    /// 队列满时原样退回元素，由调用方决定重试或上报
    #[inline]
    pub fn push(&self, value: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= N {
            return Err(value);
        }

        unsafe { (*self.slot(head)).write(value) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// 出队 (消费者)，返回最早入队的元素
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        if head == tail {
            return None;
        }

        let value = unsafe { (*self.slot(tail)).assume_init_read() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// 查看队首元素而不出队 (消费者)
    ///
    /// 生产者不会触碰已占用的槽位，因此引用在下一次 `pop` 之前有效
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        if head == tail {
            return None;
        }

        Some(unsafe { (*self.slot(tail)).assume_init_ref() })
    }

    /// 丢弃所有元素 (消费者)，返回丢弃数量
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for RingBuffer<T, N> {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_basic_operations() {
        let buf: RingBuffer<u32, 8> = RingBuffer::new();

        assert!(buf.is_empty());
        assert!(!buf.is_full());
        assert_eq!(buf.capacity(), 8);

        assert!(buf.push(1).is_ok());
        assert!(buf.push(2).is_ok());
        assert!(buf.push(3).is_ok());
        assert_eq!(buf.len(), 3);

        assert_eq!(buf.peek(), Some(&1));
        assert_eq!(buf.pop(), Some(1));
        assert_eq!(buf.pop(), Some(2));
        assert_eq!(buf.len(), 1);

        assert_eq!(buf.drain(), 1);
        assert!(buf.is_empty());
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_full_queue_returns_value() {
        let buf: RingBuffer<u8, 2> = RingBuffer::new();
        buf.push(10).unwrap();
        buf.push(11).unwrap();

        assert!(buf.is_full());
        assert_eq!(buf.push(12), Err(12));

        // 出队后腾出空间，且顺序不变
        assert_eq!(buf.pop(), Some(10));
        buf.push(12).unwrap();
        assert_eq!(buf.pop(), Some(11));
        assert_eq!(buf.pop(), Some(12));
    }

    #[test]
    fn test_drop_releases_elements() {
        let marker = Arc::new(());
        {
            let buf: RingBuffer<Arc<()>, 4> = RingBuffer::new();
            buf.push(marker.clone()).unwrap();
            buf.push(marker.clone()).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_spsc_preserves_order_across_threads() {
        const COUNT: u32 = 20_000;
        let buf: Arc<RingBuffer<u32, 16>> = Arc::new(RingBuffer::new());

        let producer = {
            let buf = buf.clone();
            thread::spawn(move || {
                for i in 0..COUNT {
                    let mut value = i;
                    loop {
                        match buf.push(value) {
                            Ok(()) => break,
                            Err(v) => {
                                value = v;
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(COUNT as usize);
        while received.len() < COUNT as usize {
            match buf.pop() {
                Some(v) => received.push(v),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();

        // 不丢失、不重复、保持 FIFO
        assert!(received.iter().copied().eq(0..COUNT));
        assert!(buf.is_empty());
    }
}
