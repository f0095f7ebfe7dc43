//! 可注入的时钟能力集合，以及真实/虚拟两种实现共享的 `Timer`/`Ticker` 句柄。
//!
//! # 教案级说明
//! - **意图 (Why)**：业务代码只依赖 [`Clock`] trait，测试注入 [`MockClock`](crate::MockClock)，
//!   生产注入 [`SystemClock`](crate::SystemClock)，无需修改被测代码；
//! - **契约 (What)**：两种实现对外暴露完全一致的行为契约，差异只在时间是否“自行流逝”；
//! - **实现 (How)**：句柄内部以带标签的枚举区分虚拟/系统两种后端，构造时确定，之后不做运行期类型探测。

use std::sync::mpsc::{Receiver, RecvError, TryRecvError};
use std::time::{Duration, SystemTime};

use crate::mock::VirtualHandle;
use crate::sink::Callback;
use crate::system::SystemHandle;

/// 抽象可注入的时钟，统一“读取时间 / 等待 / 一次性定时 / 周期定时 / 确认处理完成”能力。
///
/// # 设计背景（Why）
/// - 超时、心跳、延迟回调若直接调用系统时间，测试只能依赖真实等待，既慢又不稳定；
/// - 通过 trait 注入时钟，测试可以用虚拟时间显式驱动全部定时行为。
///
/// # 接口约束（What）
/// - `now` 单调不减；`since(t)` 在 `t` 晚于当前时间时饱和为零；
/// - `after`/`timer`/`after_func` 创建一次性事件，`tick`/`ticker` 创建周期事件；
/// - `confirm` 由消费者在处理完一次触发后调用：系统时钟上为空操作，虚拟时钟上转发给同步控制器。
///
/// # 使用指引（How）
/// - 推荐以 `Arc<dyn Clock>` 传给需要时间能力的组件；
/// - 周期为零的 `tick`/`ticker` 会 panic，与标准库/Tokio 对非法周期的处理一致。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前时间。
    fn now(&self) -> SystemTime;

    /// 返回自 `earlier` 以来经过的时间。
    fn since(&self, earlier: SystemTime) -> Duration {
        self.now()
            .duration_since(earlier)
            .unwrap_or(Duration::ZERO)
    }

    /// 阻塞当前线程，直到时钟前进 `duration`。
    fn sleep(&self, duration: Duration);

    /// 返回一个在 `duration` 后收到当前时间的通道。
    fn after(&self, duration: Duration) -> Receiver<SystemTime> {
        self.timer(duration).into_receiver()
    }

    /// 在 `duration` 后于推进时间的线程上执行 `callback`。
    fn after_func(&self, duration: Duration, callback: Callback) -> Timer;

    /// 便捷版 [`Clock::ticker`]，返回的通道无法停止。
    fn tick(&self, period: Duration) -> Receiver<SystemTime> {
        self.ticker(period).into_receiver()
    }

    /// 创建周期为 `period` 的节拍器。
    fn ticker(&self, period: Duration) -> Ticker;

    /// 创建在 `duration` 后触发一次的定时器。
    fn timer(&self, duration: Duration) -> Timer;

    /// 声明一次触发已处理完毕。
    fn confirm(&self);
}

/// 后端句柄：虚拟时钟事件或系统线程定时器。
#[derive(Debug)]
pub(crate) enum EventHandle {
    Virtual(VirtualHandle),
    System(SystemHandle),
}

impl EventHandle {
    fn stop(&self) -> bool {
        match self {
            EventHandle::Virtual(handle) => handle.stop(),
            EventHandle::System(handle) => handle.stop(),
        }
    }

    fn reset(&self, duration: Duration, period: Option<Duration>) -> bool {
        match self {
            EventHandle::Virtual(handle) => handle.reset(duration, period),
            EventHandle::System(handle) => handle.reset(duration, period),
        }
    }

    fn confirm(&self) {
        match self {
            EventHandle::Virtual(handle) => handle.confirm(),
            EventHandle::System(_) => {}
        }
    }
}

/// 一次性定时器。
///
/// # 教案式说明
/// - **意图 (Why)**：对齐“创建 → 触发/停止 → 重置”的生命周期，供超时与延迟任务复用；
/// - **契约 (What)**：
///   - 通过 [`Clock::timer`] 创建的定时器在触发时向通道写入触发时刻；
///   - 通过 [`Clock::after_func`] 创建的定时器没有通道，触发时执行回调；
///   - `stop`/`reset` 均返回调用前是否仍处于激活状态，对已触发或已停止的定时器调用永不报错；
/// - **注意 (Trade-offs)**：丢弃句柄不会取消定时器，已登记的事件照常触发。
#[derive(Debug)]
pub struct Timer {
    rx: Option<Receiver<SystemTime>>,
    handle: EventHandle,
}

impl Timer {
    pub(crate) fn new(rx: Option<Receiver<SystemTime>>, handle: EventHandle) -> Self {
        Self { rx, handle }
    }

    /// 结果通道；`after_func` 模式下为 `None`。
    pub fn receiver(&self) -> Option<&Receiver<SystemTime>> {
        self.rx.as_ref()
    }

    /// 阻塞读取触发时刻。回调模式或发送端已释放时返回错误。
    pub fn recv(&self) -> Result<SystemTime, RecvError> {
        match &self.rx {
            Some(rx) => rx.recv(),
            None => Err(RecvError),
        }
    }

    /// 非阻塞读取触发时刻。
    pub fn try_recv(&self) -> Result<SystemTime, TryRecvError> {
        match &self.rx {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Disconnected),
        }
    }

    /// 停止定时器，返回调用前是否仍处于激活状态。
    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    /// 以当前时间为基准重新布置定时器，返回调用前是否仍处于激活状态。
    ///
    /// 可在定时器自身的回调中调用。
    pub fn reset(&self, duration: Duration) -> bool {
        self.handle.reset(duration, None)
    }

    /// 声明本次触发已处理完毕。
    pub fn confirm(&self) {
        self.handle.confirm();
    }

    /// 取出结果通道并放弃句柄；回调模式下返回一个已断开的通道。
    pub fn into_receiver(self) -> Receiver<SystemTime> {
        match self.rx {
            Some(rx) => rx,
            None => std::sync::mpsc::sync_channel(0).1,
        }
    }
}

/// 周期节拍器。
///
/// - 每个周期向通道写入一次触发时刻；消费者跟不上时多余的节拍被丢弃而不是阻塞时钟；
/// - `reset` 同时替换周期并以当前时间为基准重新计时，对已停止的节拍器会重新启用它。
#[derive(Debug)]
pub struct Ticker {
    rx: Receiver<SystemTime>,
    handle: EventHandle,
}

impl Ticker {
    pub(crate) fn new(rx: Receiver<SystemTime>, handle: EventHandle) -> Self {
        Self { rx, handle }
    }

    pub fn receiver(&self) -> &Receiver<SystemTime> {
        &self.rx
    }

    pub fn recv(&self) -> Result<SystemTime, RecvError> {
        self.rx.recv()
    }

    pub fn try_recv(&self) -> Result<SystemTime, TryRecvError> {
        self.rx.try_recv()
    }

    /// 停止节拍器，返回调用前是否仍处于激活状态。
    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    /// 替换周期并重新计时，返回调用前是否仍处于激活状态。
    ///
    /// # Panics
    /// `period` 为零时 panic。
    pub fn reset(&self, period: Duration) -> bool {
        assert!(!period.is_zero(), "ticker period must be non-zero");
        self.handle.reset(period, Some(period))
    }

    pub fn confirm(&self) {
        self.handle.confirm();
    }

    pub fn into_receiver(self) -> Receiver<SystemTime> {
        self.rx
    }
}
