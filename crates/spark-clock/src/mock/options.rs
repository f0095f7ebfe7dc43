//! 附着在 `add`/`set` 上的可组合选项。
//!
//! # 教案式说明
//! - **意图 (Why)**：一次调用即可表达“等定时器布置好 → 推进时间 → 等所有触发的工作确认完成”；
//! - **契约 (What)**：每个选项在三个阶段之一生效，同一阶段内按传入顺序执行：
//!   1. `prior`：推进前，等待此前声明的期望兑现；
//!   2. `upcoming`：推进前，布置本次推进将引发的新期望或切换失败模式；
//!   3. `after`：推进后，等待本次推进引发的工作完成；
//! - **注意 (Trade-offs)**：等待类选项无超时，期望声明错误会让测试挂起；需要超时时请直接调用
//!   [`MockClock::wait_for_start_timeout`](crate::MockClock::wait_for_start_timeout) 等方法。

use std::sync::Arc;

use super::MockClock;
use super::failure::FailureSink;

#[derive(Clone, Debug)]
pub enum AdvanceOption {
    /// 推进前等待全部期望的注册。
    WaitForStartsBefore,
    /// 推进前等待全部期望的确认。
    WaitForConfirmsBefore,
    /// 推进前依次等待注册与确认。
    WaitBefore,
    /// 声明本次推进将引发的注册数量。
    ExpectUpcomingStarts(usize),
    /// 声明本次推进将引发的确认数量。
    ExpectUpcomingConfirms(usize),
    /// 之后的意外注册/确认上报给指定接收端。
    FailOnUnexpected(Arc<dyn FailureSink>),
    /// 关闭快速失败，意外活动计入盈余。
    IgnoreUnexpected,
    /// 推进前短暂让出 CPU，并在本次推进的每次触发后再次让出，给刚被唤醒的线程运行机会。
    OptimisticSched,
    /// 推进后等待全部期望的注册。
    WaitForStartsAfter,
    /// 推进后等待全部期望的确认。
    WaitForConfirmsAfter,
    /// 推进后依次等待注册与确认。
    WaitAfter,
}

impl AdvanceOption {
    pub(crate) fn apply_prior(&self, clock: &MockClock) {
        match self {
            AdvanceOption::WaitForStartsBefore => clock.wait_for_start(),
            AdvanceOption::WaitForConfirmsBefore => clock.wait_for_confirm(),
            AdvanceOption::WaitBefore => clock.wait(),
            _ => {}
        }
    }

    pub(crate) fn apply_upcoming(&self, clock: &MockClock) {
        match self {
            AdvanceOption::ExpectUpcomingStarts(count) => clock.expect_starts(*count),
            AdvanceOption::ExpectUpcomingConfirms(count) => clock.expect_confirms(*count),
            AdvanceOption::FailOnUnexpected(sink) => clock.set_fail_fast(Some(Arc::clone(sink))),
            AdvanceOption::IgnoreUnexpected => clock.set_fail_fast(None),
            AdvanceOption::OptimisticSched => clock.optimistic_sched(),
            _ => {}
        }
    }

    pub(crate) fn apply_after(&self, clock: &MockClock) {
        match self {
            AdvanceOption::WaitForStartsAfter => clock.wait_for_start(),
            AdvanceOption::WaitForConfirmsAfter => clock.wait_for_confirm(),
            AdvanceOption::WaitAfter => clock.wait(),
            _ => {}
        }
    }
}
