//! 条件编译日志系统
//!
//! 根据 feature 选择不同的日志后端:
//! - `log-defmt`: 使用 defmt (高效二进制日志)
//! - `dev` / `log-println`: 使用 esp-println (文本日志)
//! - `log`: 使用 `log` 门面 (主机端)
//! - 默认 (release): 完全禁用日志 (零开销)
//!
//! # 日志级别
//! - `error!`: 错误信息
//! - `warn!`: 警告信息
//! - `info!`: 一般信息
//! - `debug!`: 调试信息
//! - `trace!`: 详细跟踪

// ===================================================================
// defmt 后端 (feature = "log-defmt")
// ===================================================================
#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { defmt::error!($($arg)*) };
}

#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

// ===================================================================
// esp-println 后端 (feature = "dev" 或 "log-println")
// ===================================================================
#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { esp_println::println!("[INFO] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { esp_println::println!("[DEBUG] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { esp_println::println!("[WARN] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { esp_println::println!("[ERROR] {}", format_args!($($arg)*)) };
}

#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { esp_println::println!("[TRACE] {}", format_args!($($arg)*)) };
}

// ===================================================================
// log 门面后端 (feature = "log")
// ===================================================================
#[cfg(all(
    feature = "log",
    not(any(feature = "dev", feature = "log-defmt", feature = "log-println"))
))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { ::log::info!(target: "soc_hub", $($arg)*) };
}

#[cfg(all(
    feature = "log",
    not(any(feature = "dev", feature = "log-defmt", feature = "log-println"))
))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { ::log::debug!(target: "soc_hub", $($arg)*) };
}

#[cfg(all(
    feature = "log",
    not(any(feature = "dev", feature = "log-defmt", feature = "log-println"))
))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { ::log::warn!(target: "soc_hub", $($arg)*) };
}

#[cfg(all(
    feature = "log",
    not(any(feature = "dev", feature = "log-defmt", feature = "log-println"))
))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { ::log::error!(target: "soc_hub", $($arg)*) };
}

#[cfg(all(
    feature = "log",
    not(any(feature = "dev", feature = "log-defmt", feature = "log-println"))
))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { ::log::trace!(target: "soc_hub", $($arg)*) };
}

// ===================================================================
// 空实现 (无日志 feature)
// 参数仍参与类型检查，避免未使用变量告警
// ===================================================================
#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println", feature = "log")))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println", feature = "log")))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println", feature = "log")))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println", feature = "log")))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println", feature = "log")))]
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

// ===================================================================
// 便捷重导出
// ===================================================================
pub use log_debug;
pub use log_error;
pub use log_info;
pub use log_trace;
pub use log_warn;

// ===================================================================
// 断言宏 (release 模式下移除)
// ===================================================================

/// Debug 断言 (仅在 debug 模式下检查)
///
/// 用于无法在运行时廉价检测的前置条件，例如内核栈重入
#[macro_export]
macro_rules! debug_assert_msg {
    ($cond:expr, $($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            if !$cond {
                $crate::log_error!("Assertion failed");
                panic!("Assertion failed: {}", format_args!($($arg)*));
            }
        }
    };
}

pub use debug_assert_msg;
