#![deny(unsafe_code)]
#![doc = "spark-clock: 可注入的时钟抽象与确定性的虚拟时钟引擎。"]
#![doc = ""]
#![doc = "== 定位 =="]
#![doc = "业务代码只依赖 [`Clock`] trait；生产环境注入 [`SystemClock`]，测试注入 [`MockClock`]，由测试线程显式推进虚拟时间。"]
#![doc = ""]
#![doc = "== 同步协议 =="]
#![doc = "[`MockClock::expect_starts`]/[`MockClock::wait_for_start`] 保证推进前定时器已布置；[`MockClock::expect_confirms`]/[`MockClock::wait_for_confirm`] 保证断言前触发的处理已完成。"]
#![doc = "推进选项见 [`AdvanceOption`]，意外活动的上报出口见 [`FailureSink`]。"]
#![doc = ""]
#![doc = "== 可观测性 =="]
#![doc = "本 crate 只发出 `tracing` 事件，从不安装订阅者：推进摘要为 `debug`，逐次触发为 `trace`，快速失败上报为 `error`，同步等待超时为 `warn`。"]

mod clock;
pub mod config;
pub mod context;
pub mod error;
mod mock;
mod sink;
mod system;

pub use clock::{Clock, Ticker, Timer};
pub use config::{MockClockBuilder, MockClockConfig};
pub use context::{CancelHandle, DeadlineContext, with_cancel, with_deadline, with_timeout};
pub use error::{ClockError, ContextError};
pub use mock::{
    AdvanceOption, DEFAULT_OPTIMISTIC_SCHED, FailureLog, FailureSink, Hook, HookId, HookPoint,
    MockClock, PanicSink, UnexpectedEvent, UnexpectedKind,
};
pub use sink::Callback;
pub use system::SystemClock;
