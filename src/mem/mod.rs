//! 内存管理模块
//!
//! DMA 通路使用的帧缓冲 (对齐、定长、按值流转)。

pub mod dma;

pub use dma::{DmaFrame, DMA_ALIGNMENT};
