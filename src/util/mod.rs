//! 通用工具: 条件编译日志与调试断言

pub mod log;
