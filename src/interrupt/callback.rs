//! 中断回调声明
//!
//! 回调签名固定为 `fn(AppData)`。每个回调同时声明它在内核栈上的最坏用量，
//! 同一个中断许可作用域内的所有回调组成一个 "组"，内核栈按组内最贪婪的成员分配。

use core::ffi::c_void;
use core::ptr::NonNull;

use crate::config::{KSTACK_MIN_WORDS, KSTACK_OVERHEAD_WORDS};

/// 应用上下文指针
///
/// 由注册方提供、注册方拥有，Hub 与中断核心从不解引用，只原样交给回调。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppData(NonNull<c_void>);

// Safety: 指针只是不透明的令牌，解引用的责任在回调自身
unsafe impl Send for AppData {}
unsafe impl Sync for AppData {}

impl AppData {
    /// 包装一个静态对象的地址
    pub fn from_static<T: Sync>(value: &'static T) -> Self {
        Self(NonNull::from(value).cast())
    }

    /// 包装裸指针，空指针返回 `None`
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// 取回静态对象引用
    ///
    /// # Safety
    /// 必须与 `from_static::<T>` 的 `T` 一致
    pub unsafe fn as_static<T>(self) -> &'static T {
        self.0.cast::<T>().as_ref()
    }
}

/// 中断回调及其栈用量元数据
#[derive(Clone, Copy)]
pub struct IsrCallback {
    name: &'static str,
    handler: fn(AppData),
    stack_words: usize,
}

impl IsrCallback {
    /// 声明回调
    ///
    /// `stack_words` 为回调及其全部被调函数的最坏栈深度 (字)
    pub const fn new(name: &'static str, handler: fn(AppData), stack_words: usize) -> Self {
        Self {
            name,
            handler,
            stack_words,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn stack_words(&self) -> usize {
        self.stack_words
    }

    /// 普通调用入口，不经过内核栈
    pub fn call(&self, data: AppData) {
        (self.handler)(data)
    }
}

impl core::fmt::Debug for IsrCallback {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IsrCallback")
            .field("name", &self.name)
            .field("stack_words", &self.stack_words)
            .finish()
    }
}

/// 计算一组回调所需的内核栈字数
///
/// 取组内最大用量加上分发开销，且不小于板级配置的下限
pub const fn isr_group_words(group: &[IsrCallback]) -> usize {
    let mut greediest = 0;
    let mut i = 0;
    while i < group.len() {
        if group[i].stack_words > greediest {
            greediest = group[i].stack_words;
        }
        i += 1;
    }
    let words = greediest + KSTACK_OVERHEAD_WORDS;
    // 偶数字保证栈顶 16 字节对齐
    let words = if words < KSTACK_MIN_WORDS { KSTACK_MIN_WORDS } else { words };
    (words + 1) & !1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: AppData) {}

    const SMALL: IsrCallback = IsrCallback::new("small", noop, 64);
    const GREEDY: IsrCallback = IsrCallback::new("greedy", noop, 301);

    #[test]
    fn test_group_sized_by_greediest_member() {
        let words = isr_group_words(&[SMALL, GREEDY]);
        assert!(words >= 301 + KSTACK_OVERHEAD_WORDS);
        assert!(words >= KSTACK_MIN_WORDS);
        assert_eq!(words % 2, 0);
        assert!(isr_group_words(&[SMALL]) <= words);
    }

    #[test]
    fn test_group_words_usable_as_const_generic() {
        const WORDS: usize = isr_group_words(&[SMALL, GREEDY]);
        let buf = [0usize; WORDS];
        assert_eq!(buf.len(), WORDS);
    }

    #[test]
    fn test_app_data_round_trip() {
        static VALUE: u32 = 7;
        let data = AppData::from_static(&VALUE);
        assert_eq!(unsafe { *data.as_static::<u32>() }, 7);
        assert!(AppData::from_ptr(core::ptr::null_mut()).is_none());
    }
}
