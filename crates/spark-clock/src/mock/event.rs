//! 定时事件：一次性的 Timer 与周期性的 Ticker。
//!
//! 事件本身不保存“是否激活”标记：事件在注册表中即为激活，出注册表即为失活，
//! 由此保证“失活事件永不出现在注册表中”这一不变量只有唯一的事实来源。

use std::time::{Duration, SystemTime};

use crate::sink::{Delivery, Sink};

/// 虚拟时钟内的事件标识，按创建顺序单调分配。
pub(crate) type EventId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    Timer,
    Ticker { period: Duration },
}

impl EventKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            EventKind::Timer => "timer",
            EventKind::Ticker { .. } => "ticker",
        }
    }
}

#[derive(Debug)]
pub(crate) struct TimedEvent {
    kind: EventKind,
    fire_at: SystemTime,
    sink: Sink,
    /// 句柄已被丢弃，事件失活后即可回收。
    detached: bool,
}

/// 一次触发的产物：锁外执行的投递动作，以及周期事件的下一次触发时间。
pub(crate) struct Fired {
    pub(crate) delivery: Delivery,
    pub(crate) next_fire_at: Option<SystemTime>,
}

impl TimedEvent {
    pub(crate) fn new(kind: EventKind, fire_at: SystemTime, sink: Sink) -> Self {
        Self {
            kind,
            fire_at,
            sink,
            detached: false,
        }
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn fire_at(&self) -> SystemTime {
        self.fire_at
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
    }

    /// 重新布置事件；`period` 仅对 Ticker 生效。
    pub(crate) fn reschedule(&mut self, fire_at: SystemTime, period: Option<Duration>) {
        self.fire_at = fire_at;
        if let (EventKind::Ticker { period: current }, Some(period)) = (&mut self.kind, period) {
            *current = period;
        }
    }

    /// 在 `now` 触发事件。
    ///
    /// - Timer：返回投递动作，`next_fire_at` 为 `None`，调用方不再把它放回注册表；
    /// - Ticker：下一次触发时间从本次应触发时间顺延一个周期，而不是从推进目标计算，避免漂移。
    ///   顺延溢出时节拍器随之失活。
    pub(crate) fn fire(&mut self, now: SystemTime) -> Fired {
        let delivery = self.sink.delivery(now);
        let next_fire_at = match self.kind {
            EventKind::Timer => None,
            EventKind::Ticker { period } => self.fire_at.checked_add(period),
        };
        if let Some(next) = next_fire_at {
            self.fire_at = next;
        }
        Fired {
            delivery,
            next_fire_at,
        }
    }
}
