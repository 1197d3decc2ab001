//! DMA 帧缓冲
//!
//! Hub 与外设之间搬运的数据单元。每一帧是一块对齐的定长存储加有效长度，
//! 在环形队列里按值流转。
//!
//! # DMA 限制
//!
//! - 缓冲区必须 4 字节对齐 (推荐 32 字节以匹配 cache line)
//! - 单帧长度上限由 `config::DMA_FRAME_SIZE` 决定，握手协议里的长度字段为 `u16`
//!
//! # 示例
//!
//! ```rust,ignore
//! use soc_hub::mem::dma::DmaFrame;
//!
//! let frame = DmaFrame::<512>::from_slice(&[1, 2, 3]).unwrap();
//! assert_eq!(frame.as_slice(), &[1, 2, 3]);
//! ```

use crate::config::DMA_FRAME_SIZE;

/// DMA 缓冲区对齐要求
pub const DMA_ALIGNMENT: usize = 32;

/// DMA 帧
///
/// # 类型参数
///
/// - `SIZE`: 帧容量 (字节)
#[repr(C, align(32))]
pub struct DmaFrame<const SIZE: usize = DMA_FRAME_SIZE> {
    /// 实际数据存储
    data: [u8; SIZE],
    /// 有效长度
    len: usize,
}

const _: () = assert!(core::mem::align_of::<DmaFrame>() >= DMA_ALIGNMENT);

impl<const SIZE: usize> DmaFrame<SIZE> {
    /// 创建空帧
    pub const fn new() -> Self {
        Self {
            data: [0u8; SIZE],
            len: 0,
        }
    }

    /// 从切片复制整帧，超出容量时返回 `None`
    pub fn from_slice(src: &[u8]) -> Option<Self> {
        if src.len() > SIZE {
            return None;
        }
        let mut frame = Self::new();
        frame.data[..src.len()].copy_from_slice(src);
        frame.len = src.len();
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 有效数据
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// 以 `limit` 为上限向帧内填充数据
    ///
    /// `fill` 拿到的切片长度为 `min(limit, SIZE)`，返回值为实际写入字节数；
    /// 超出切片长度的返回值会被截断
    pub fn fill_with<F>(&mut self, limit: usize, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let window = limit.min(SIZE);
        let written = fill(&mut self.data[..window]);
        crate::debug_assert_msg!(written <= window, "DMA source overran the frame window");
        self.len = written.min(window);
        self.len
    }

    /// 复制数据到切片，返回复制的字节数
    pub fn copy_to_slice(&self, dst: &mut [u8]) -> usize {
        let len = dst.len().min(self.len);
        dst[..len].copy_from_slice(&self.data[..len]);
        len
    }
}

impl<const SIZE: usize> Default for DmaFrame<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> core::fmt::Debug for DmaFrame<SIZE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaFrame").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_alignment() {
        let frames = [DmaFrame::<64>::new(), DmaFrame::<64>::new()];
        for frame in &frames {
            assert_eq!(frame as *const _ as usize % DMA_ALIGNMENT, 0);
        }
    }

    #[test]
    fn test_from_slice_rejects_oversize() {
        assert!(DmaFrame::<4>::from_slice(&[0; 5]).is_none());
        let frame = DmaFrame::<4>::from_slice(&[9; 4]).unwrap();
        assert_eq!(frame.as_slice(), &[9; 4]);
    }

    #[test]
    fn test_fill_with_respects_limit() {
        let mut frame = DmaFrame::<16>::new();
        let written = frame.fill_with(6, |window| {
            assert_eq!(window.len(), 6);
            window.fill(0xAA);
            window.len()
        });
        assert_eq!(written, 6);
        assert_eq!(frame.as_slice(), &[0xAA; 6]);

        // 上限超过容量时按容量截断
        let written = frame.fill_with(100, |window| window.len());
        assert_eq!(written, 16);
    }
}
