use std::sync::atomic::{AtomicU64, Ordering};

/// 聊天消息序列号分配器
///
/// 从 0 开始，每条广播消息递增 1，进程运行期间不重置。
#[derive(Debug, Default)]
pub struct MessageSequencer {
    next: AtomicU64,
}

impl MessageSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前序列号并递增
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// 已分配的序列号数量
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
