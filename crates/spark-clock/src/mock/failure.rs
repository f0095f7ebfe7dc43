//! 快速失败模式下，意外注册/确认的上报出口。
//!
//! # 教案式说明
//! - **意图 (Why)**：测试忘记声明期望（`expect_starts`/`expect_confirms`）时，应当立刻暴露，而不是在
//!   后续某次 `wait_for_*` 中莫名其妙地挂起或提前返回；
//! - **契约 (What)**：[`FailureSink::report`] 总是在时钟内部锁之外调用，实现可以安全地 panic 或再次访问时钟；
//! - **取舍 (Trade-offs)**：[`PanicSink`] 在触发意外事件的线程上 panic，若该线程是工作线程，测试主线程
//!   只能通过 join 观察到失败；跨线程场景更推荐 [`FailureLog`] 记录后由控制线程统一断言。

use std::fmt;
use std::time::SystemTime;

use parking_lot::Mutex;

/// 意外事件的类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnexpectedKind {
    TimerStart,
    TickerStart,
    Confirmation,
}

impl fmt::Display for UnexpectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnexpectedKind::TimerStart => f.write_str("unexpected timer start"),
            UnexpectedKind::TickerStart => f.write_str("unexpected ticker start"),
            UnexpectedKind::Confirmation => f.write_str("unexpected confirmation"),
        }
    }
}

/// 一次意外事件及其发生时的虚拟时间。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnexpectedEvent {
    pub kind: UnexpectedKind,
    pub at: SystemTime,
}

impl fmt::Display for UnexpectedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at virtual time {:?}", self.kind, self.at)
    }
}

/// 测试失败接收端。
pub trait FailureSink: Send + Sync + fmt::Debug + 'static {
    fn report(&self, event: UnexpectedEvent);
}

/// 直接 panic，使当前测试线程失败。
#[derive(Clone, Copy, Debug, Default)]
pub struct PanicSink;

impl FailureSink for PanicSink {
    fn report(&self, event: UnexpectedEvent) {
        panic!("{event}");
    }
}

/// 记录所有意外事件，供控制线程在断言阶段检查。
#[derive(Debug, Default)]
pub struct FailureLog {
    events: Mutex<Vec<UnexpectedEvent>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前记录的快照。
    pub fn events(&self) -> Vec<UnexpectedEvent> {
        self.events.lock().clone()
    }

    /// 取出并清空记录。
    pub fn take(&self) -> Vec<UnexpectedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

impl FailureSink for FailureLog {
    fn report(&self, event: UnexpectedEvent) {
        self.events.lock().push(event);
    }
}
