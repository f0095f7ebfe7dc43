//! 基于宿主时间设施的真实时钟。
//!
//! # 教案级说明
//! - **意图 (Why)**：与 [`MockClock`](crate::MockClock) 实现同一 [`Clock`] 契约，使业务代码在生产环境
//!   无需任何改动即可运行；
//! - **实现 (How)**：每个定时器/节拍器由一个后台线程驱动，线程在 `Condvar` 上等待截止时间，
//!   `stop`/`reset` 通过修改截止时间并唤醒线程生效；事件失活后线程自行退出；
//! - **权衡 (Trade-offs)**：每个激活中的定时器占用一个线程，适用于控制面低频定时；
//!   高频场景应在宿主运行时中注入专用实现。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::{Clock, EventHandle, Ticker, Timer};
use crate::sink::{Callback, Sink};

/// 直接委托给 `std::time` 与 `std::thread` 的系统时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        SystemClock
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn after_func(&self, duration: Duration, callback: Callback) -> Timer {
        let handle = SystemHandle::arm(Sink::callback(callback), duration, None);
        Timer::new(None, EventHandle::System(handle))
    }

    fn ticker(&self, period: Duration) -> Ticker {
        assert!(!period.is_zero(), "ticker period must be non-zero");
        let (sink, rx) = Sink::channel();
        let handle = SystemHandle::arm(sink, period, Some(period));
        Ticker::new(rx, EventHandle::System(handle))
    }

    fn timer(&self, duration: Duration) -> Timer {
        let (sink, rx) = Sink::channel();
        let handle = SystemHandle::arm(sink, duration, None);
        Timer::new(Some(rx), EventHandle::System(handle))
    }

    fn confirm(&self) {}
}

#[derive(Debug)]
struct SystemEvent {
    state: Mutex<SystemEventState>,
    cond: Condvar,
    sink: Sink,
}

#[derive(Debug)]
struct SystemEventState {
    /// `None` 表示事件未激活。
    deadline: Option<Instant>,
    period: Option<Duration>,
    worker_running: bool,
}

/// 系统定时器句柄；后台线程持有另一份 `Arc`，句柄丢弃不影响触发。
#[derive(Debug)]
pub(crate) struct SystemHandle {
    event: Arc<SystemEvent>,
}

impl SystemHandle {
    fn arm(sink: Sink, duration: Duration, period: Option<Duration>) -> Self {
        let event = Arc::new(SystemEvent {
            state: Mutex::new(SystemEventState {
                deadline: None,
                period,
                worker_running: false,
            }),
            cond: Condvar::new(),
            sink,
        });
        let handle = SystemHandle { event };
        handle.reset(duration, period);
        handle
    }

    pub(crate) fn stop(&self) -> bool {
        let mut state = self.event.state.lock();
        let was_active = state.deadline.take().is_some();
        self.event.cond.notify_all();
        was_active
    }

    /// 以当前时间为基准重新布置事件；截止时间不可表示时事件永不到期，按失活处理。
    pub(crate) fn reset(&self, duration: Duration, period: Option<Duration>) -> bool {
        let mut state = self.event.state.lock();
        let was_active = state.deadline.is_some();
        state.deadline = Instant::now().checked_add(duration);
        if period.is_some() {
            state.period = period;
        }
        if state.deadline.is_none() {
            self.event.cond.notify_all();
        } else if state.worker_running {
            self.event.cond.notify_all();
        } else {
            state.worker_running = true;
            let event = Arc::clone(&self.event);
            thread::spawn(move || run_worker(event));
        }
        was_active
    }
}

/// 后台线程主循环：等到截止时间后投递，周期事件顺延一个周期，一次性事件随即失活。
fn run_worker(event: Arc<SystemEvent>) {
    let mut state = event.state.lock();
    loop {
        let Some(deadline) = state.deadline else {
            state.worker_running = false;
            return;
        };
        if Instant::now() < deadline {
            event.cond.wait_until(&mut state, deadline);
            continue;
        }
        state.deadline = state
            .period
            .and_then(|period| deadline.checked_add(period));
        let delivery = event.sink.delivery(SystemTime::now());
        MutexGuard::unlocked(&mut state, || {
            delivery.run();
        });
    }
}
