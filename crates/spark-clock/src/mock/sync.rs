//! 同步控制器：期望计数与实际观测（注册/确认）之间的对账。
//!
//! # 教案级说明
//! - **意图 (Why)**：消除时间模拟中的两类经典竞态：
//!   1. 控制线程在工作线程登记定时器之前就推进了时间，导致事件被“跳过”；
//!   2. 控制线程在触发的处理逻辑完成之前就开始断言副作用；
//! - **契约 (What)**：
//!   - 每次注册/确认要么消耗一个未兑现的期望，要么被归类为“意外”；
//!   - 未启用快速失败时，意外活动计入 `surplus`，在下一次 `expect_*` 时被追溯抵扣；
//!   - 未兑现计数永不为负；
//! - **实现 (How)**：本结构是纯状态机，不含任何阻塞原语；阻塞等待由虚拟时钟在同一把锁上配合
//!   `Condvar` 完成，状态机只负责告诉调用方“是否需要唤醒等待者”。

use std::sync::Arc;

use super::failure::FailureSink;

/// 单一维度（注册或确认）的期望账本。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Expectation {
    outstanding: usize,
    surplus: usize,
}

/// 一次观测的归类结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Observation {
    /// 消耗了一个期望；`released` 表示计数恰好归零，需要唤醒等待者。
    Consumed { released: bool },
    /// 没有期望且启用了快速失败，应上报。
    Unexpected,
    /// 没有期望，计入盈余。
    Surplus,
}

impl Expectation {
    /// 声明接下来的 `count` 次活动，先用盈余抵扣，剩余部分计入未兑现，盈余随即清零。
    fn expect(&mut self, count: usize) {
        let absorbed = count.min(self.surplus);
        self.outstanding += count - absorbed;
        self.surplus = 0;
    }

    fn observe(&mut self, fail_fast: bool) -> Observation {
        if self.outstanding > 0 {
            self.outstanding -= 1;
            Observation::Consumed {
                released: self.outstanding == 0,
            }
        } else if fail_fast {
            Observation::Unexpected
        } else {
            self.surplus += 1;
            Observation::Surplus
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[cfg(test)]
    pub(crate) fn surplus(&self) -> usize {
        self.surplus
    }
}

#[derive(Debug, Default)]
pub(crate) struct SyncController {
    starts: Expectation,
    confirms: Expectation,
    fail_fast: Option<Arc<dyn FailureSink>>,
}

impl SyncController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn expect_starts(&mut self, count: usize) {
        self.starts.expect(count);
    }

    pub(crate) fn expect_confirms(&mut self, count: usize) {
        self.confirms.expect(count);
    }

    pub(crate) fn record_start(&mut self) -> Observation {
        let fail_fast = self.fail_fast.is_some();
        self.starts.observe(fail_fast)
    }

    pub(crate) fn record_confirm(&mut self) -> Observation {
        let fail_fast = self.fail_fast.is_some();
        self.confirms.observe(fail_fast)
    }

    pub(crate) fn starts(&self) -> Expectation {
        self.starts
    }

    pub(crate) fn confirms(&self) -> Expectation {
        self.confirms
    }

    pub(crate) fn set_fail_fast(&mut self, sink: Option<Arc<dyn FailureSink>>) {
        self.fail_fast = sink;
    }

    pub(crate) fn fail_fast(&self) -> Option<Arc<dyn FailureSink>> {
        self.fail_fast.clone()
    }
}
