//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中声明虚拟时钟引擎对外暴露的错误语义，保证测试代码可以用 `?` 传播并精确匹配失败原因；
//! - 区分“调用方用法错误”（时间回拨、溢出）与“同步等待失败”（等待超时），便于测试断言定位问题。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 错误只描述本地、同步的失败；引擎内不存在重试语义，是否重新布置定时器由调用方决定。

use std::time::{Duration, SystemTime};

use thiserror::Error;

/// 虚拟时钟核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：`set` 回拨、`add` 溢出等误用必须显式失败，静默钳制会掩盖测试缺陷；
/// - **契约 (What)**：所有变体均为 `Send + Sync + 'static`，返回错误时时钟状态保持调用前不变；
/// - **风险 (Trade-offs)**：`SystemTime` 以 `Debug` 形式输出，可读性一般，但避免引入日历依赖。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// `set` 的目标早于当前虚拟时间。
    #[error("cannot move virtual time backwards: now is {now:?}, requested {target:?}")]
    TimeRegression { now: SystemTime, target: SystemTime },

    /// 目标时间超出 `SystemTime` 的可表示范围。
    #[error("virtual time overflow: {base:?} + {delta:?} is not representable")]
    Overflow { base: SystemTime, delta: Duration },

    /// 查询下一次触发时间时没有任何已登记的事件。
    #[error("no pending timers or tickers are registered")]
    NoPendingEvents,

    /// 带超时的同步等待在期满时仍有未兑现的期望。
    ///
    /// - `what`：等待对象（`"starts"` 或 `"confirms"`）；
    /// - `outstanding`：超时时刻仍未兑现的数量。
    #[error("timed out waiting for {what}: {outstanding} still outstanding")]
    WaitTimedOut {
        what: &'static str,
        outstanding: usize,
    },

    /// 配置解析或校验失败。
    #[error("invalid mock clock configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ClockError {
    fn from(value: toml::de::Error) -> Self {
        ClockError::Config(value.to_string())
    }
}

/// 截止上下文结束的原因。
///
/// - `Canceled`：调用方主动取消，或父上下文已结束；
/// - `DeadlineExceeded`：时钟推进到（或越过）截止时间。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
