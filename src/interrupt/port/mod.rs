//! 平台端口选择
//!
//! `Port` 是当前目标上 [`InterruptHal`](super::hal::InterruptHal) 与
//! [`KernelEntry`](super::hal::KernelEntry) 的唯一实现。

#[cfg(feature = "esp32s3")]
mod xtensa;
#[cfg(feature = "esp32s3")]
pub use xtensa::XtensaPort as Port;

#[cfg(all(not(feature = "esp32s3"), any(test, feature = "std")))]
mod host;
#[cfg(all(not(feature = "esp32s3"), any(test, feature = "std")))]
pub use host::HostPort as Port;

#[cfg(not(any(feature = "esp32s3", feature = "std", test)))]
compile_error!("soc-hub needs a port: enable either the `std` (host) or the `esp32s3` feature");
