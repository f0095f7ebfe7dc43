//! 虚拟时钟引擎。
//!
//! # 教案级说明
//! - **意图 (Why)**：超时、心跳、延迟回调在测试中必须可重复；虚拟时钟让时间只在测试显式调用
//!   [`MockClock::add`]/[`MockClock::set`] 时前进，并按 `fire_at` 顺序逐个触发到期事件；
//! - **契约 (What)**：
//!   - `now` 单调不减，只被推进算法修改；
//!   - 每次推进内，事件按 `fire_at` 非降序触发，`fire_at` 相同按注册顺序；
//!   - 触发期间 `now` 等于该事件的 `fire_at`，推进结束后 `now` 等于目标时间；
//!   - 投递（通道写入或回调）一律在内部锁之外执行，回调可以安全地再次调用 `add`/`stop`/`reset`；
//! - **实现 (How)**：
//!   - 单把 `parking_lot::Mutex` 保护当前时间、事件表、注册表与同步计数，`Condvar` 与之配对实现阻塞等待；
//!   - 不同线程的推进由可重入闸门串行化，同一线程在回调内的嵌套推进直接放行；
//!   - 句柄只持有 `Weak` 引用，时钟被释放后句柄操作退化为空操作并报告“未激活”。

mod event;
mod failure;
mod hooks;
mod options;
mod registry;
mod sync;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use tracing::{debug, error, trace, warn};

use crate::clock::{Clock, EventHandle, Ticker, Timer};
use crate::config::{MockClockBuilder, MockClockConfig};
use crate::error::ClockError;
use crate::sink::{Callback, DeliveryOutcome, Sink};

use self::event::{EventId, EventKind, Fired, TimedEvent};
use self::hooks::HookTable;
use self::registry::EventRegistry;
use self::sync::{Observation, SyncController};

pub use self::failure::{FailureLog, FailureSink, PanicSink, UnexpectedEvent, UnexpectedKind};
pub use self::hooks::{Hook, HookId, HookPoint};
pub use self::options::AdvanceOption;

/// `OptimisticSched` 以及同步模式下每次让出 CPU 的默认时长。
pub const DEFAULT_OPTIMISTIC_SCHED: Duration = Duration::from_millis(1);

/// 虚拟时钟。
///
/// # 设计动机（Why）
/// - 被测代码通过 [`Clock`] 创建定时器，测试线程通过 `add`/`set` 决定它们何时触发；
/// - 配合 `expect_starts`/`wait_for_start` 与 `expect_confirms`/`wait_for_confirm`，测试可以在推进前确认
///   定时器已经布置好，并在断言前确认触发的处理逻辑已经完成。
///
/// # 契约说明（What）
/// - 克隆得到的实例共享同一份虚拟时间；
/// - `set` 的目标早于当前时间时返回 [`ClockError::TimeRegression`]，时间保持不变且不触发任何事件；
/// - 通道容量为 1，消费者跟不上时多余的投递被丢弃，推进线程从不阻塞在投递上。
///
/// # 使用示例（How）
/// ```
/// use std::time::{Duration, SystemTime};
/// use spark_clock::{Clock, MockClock};
///
/// let clock = MockClock::new();
/// let timer = clock.timer(Duration::from_secs(10));
/// clock.add(Duration::from_secs(9), &[]).unwrap();
/// assert!(timer.try_recv().is_err());
/// clock.add(Duration::from_secs(1), &[]).unwrap();
/// assert_eq!(timer.try_recv(), Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(10)));
/// ```
#[derive(Clone, Debug)]
pub struct MockClock {
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<State>,
    /// 同步计数归零时唤醒 `wait_for_*`。
    sync_cond: Condvar,
    advance_gate: ReentrantMutex<()>,
}

#[derive(Debug)]
struct State {
    now: SystemTime,
    events: HashMap<EventId, TimedEvent>,
    registry: EventRegistry,
    next_id: EventId,
    sync: SyncController,
    hooks: HookTable,
    /// 每次推进前等待注册、推进后等待确认。
    synchronized: bool,
    optimistic_sched: Duration,
}

/// 构造虚拟时钟所需的全部参数，由构建器与配置统一汇总。
#[derive(Debug)]
pub(crate) struct MockClockParts {
    pub(crate) start: SystemTime,
    pub(crate) synchronized: bool,
    pub(crate) expected_starts: usize,
    pub(crate) fail_fast: Option<Arc<dyn FailureSink>>,
    pub(crate) optimistic_sched: Duration,
}

impl Default for MockClockParts {
    fn default() -> Self {
        Self {
            start: SystemTime::UNIX_EPOCH,
            synchronized: false,
            expected_starts: 0,
            fail_fast: None,
            optimistic_sched: DEFAULT_OPTIMISTIC_SCHED,
        }
    }
}

impl MockClock {
    /// 创建起始于 Unix 纪元的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(SystemTime::UNIX_EPOCH)
    }

    /// 以指定起始时间构造虚拟时钟。
    pub fn with_start(start: SystemTime) -> Self {
        Self::from_parts(MockClockParts {
            start,
            ..MockClockParts::default()
        })
    }

    /// 创建虚拟时钟并立即应用选项的 `upcoming` 阶段，例如预先声明期望或开启快速失败。
    pub fn with_options(options: &[AdvanceOption]) -> Self {
        let clock = Self::new();
        for option in options {
            option.apply_upcoming(&clock);
        }
        clock
    }

    /// 同步模式预设：开启快速失败、预先声明 `expected_starts` 次注册，
    /// 此后每次 `add`/`set` 都在推进前等待注册、推进后等待确认。
    pub fn synchronized(sink: Arc<dyn FailureSink>, expected_starts: usize) -> Self {
        MockClockBuilder::new()
            .synchronized(true)
            .expect_starts(expected_starts)
            .fail_fast(sink)
            .build()
    }

    pub fn builder() -> MockClockBuilder {
        MockClockBuilder::new()
    }

    /// 按配置构造虚拟时钟。
    pub fn from_config(config: &MockClockConfig) -> Self {
        MockClockBuilder::from_config(config).build()
    }

    pub(crate) fn from_parts(parts: MockClockParts) -> Self {
        let mut sync = SyncController::new();
        sync.set_fail_fast(parts.fail_fast);
        sync.expect_starts(parts.expected_starts);
        let state = State {
            now: parts.start,
            events: HashMap::new(),
            registry: EventRegistry::new(),
            next_id: 0,
            sync,
            hooks: HookTable::default(),
            synchronized: parts.synchronized,
            optimistic_sched: parts.optimistic_sched,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                sync_cond: Condvar::new(),
                advance_gate: ReentrantMutex::new(()),
            }),
        }
    }

    /// 将虚拟时间推进 `delta`，按顺序触发所有 `fire_at <= now + delta` 的事件。
    ///
    /// # 契约说明（What）
    /// - 返回后 `now` 至少为调用时的 `now + delta`（回调内的嵌套推进可能让它更晚）；
    /// - 目标时间无法表示时返回 [`ClockError::Overflow`]，此时不执行任何选项；
    /// - `delta` 为零同样会触发已经到期（例如零延迟）的事件。
    pub fn add(&self, delta: Duration, options: &[AdvanceOption]) -> Result<(), ClockError> {
        self.advance(options, |now| {
            now.checked_add(delta)
                .ok_or(ClockError::Overflow { base: now, delta })
        })
    }

    /// 将虚拟时间设置为 `target`，按顺序触发所有 `fire_at <= target` 的事件。
    ///
    /// `target` 早于当前时间时返回 [`ClockError::TimeRegression`]，不执行任何选项。
    pub fn set(&self, target: SystemTime, options: &[AdvanceOption]) -> Result<(), ClockError> {
        self.advance(options, |now| {
            if target < now {
                Err(ClockError::TimeRegression { now, target })
            } else {
                Ok(target)
            }
        })
    }

    /// 推进的完整阶段序列：
    /// 1. 校验目标时间；
    /// 2. 同步模式下等待注册；
    /// 3. 依次执行全部选项的 `prior` 阶段，再执行全部 `upcoming` 阶段；
    /// 4. 触发到期事件并把 `now` 推至目标；
    /// 5. 执行全部选项的 `after` 阶段，同步模式下等待确认。
    fn advance(
        &self,
        options: &[AdvanceOption],
        resolve: impl FnOnce(SystemTime) -> Result<SystemTime, ClockError>,
    ) -> Result<(), ClockError> {
        let _gate = self.shared.advance_gate.lock();
        let (from, synchronized) = {
            let state = self.shared.state.lock();
            (state.now, state.synchronized)
        };
        let target = resolve(from)?;

        if synchronized {
            self.wait_for_start();
        }
        for option in options {
            option.apply_prior(self);
        }
        for option in options {
            option.apply_upcoming(self);
        }

        let yield_per_fire = synchronized
            || options
                .iter()
                .any(|option| matches!(option, AdvanceOption::OptimisticSched));
        let fired = self.fire_due(target, yield_per_fire);
        {
            let mut state = self.shared.state.lock();
            if state.now < target {
                state.now = target;
            }
        }
        debug!(from = ?from, to = ?target, fired, "virtual clock advanced");

        for option in options {
            option.apply_after(self);
        }
        if synchronized {
            self.wait_for_confirm();
        }
        Ok(())
    }

    /// 逐个弹出并触发 `fire_at <= target` 的事件，返回触发次数。
    fn fire_due(&self, target: SystemTime, yield_per_fire: bool) -> usize {
        let mut fired = 0;
        loop {
            let (id, kind, at, delivery, pause) = {
                let mut guard = self.shared.state.lock();
                let state = &mut *guard;
                match state.registry.peek_min() {
                    Some((fire_at, _)) if fire_at <= target => {}
                    _ => break,
                }
                let Some((fire_at, id)) = state.registry.pop_min() else {
                    break;
                };
                // 嵌套推进可能已把 `now` 推过 `fire_at`，此时保持单调。
                if fire_at > state.now {
                    state.now = fire_at;
                }
                let now = state.now;
                let Some(event) = state.events.get_mut(&id) else {
                    continue;
                };
                let kind = event.kind();
                let Fired {
                    delivery,
                    next_fire_at,
                } = event.fire(now);
                match next_fire_at {
                    Some(next) => state.registry.insert(id, next),
                    None if event.is_detached() => {
                        state.events.remove(&id);
                    }
                    None => {}
                }
                (id, kind, now, delivery, state.optimistic_sched)
            };

            let outcome = delivery.run();
            fired += 1;
            trace!(
                event = id,
                kind = kind.label(),
                at = ?at,
                ?outcome,
                "virtual event fired"
            );
            if outcome == DeliveryOutcome::Dropped {
                trace!(
                    event = id,
                    kind = kind.label(),
                    "tick dropped: receiver still holds the previous value"
                );
            }
            if yield_per_fire {
                thread::sleep(pause);
            }
        }
        fired
    }

    /// 声明接下来将有 `count` 个定时器/节拍器被创建。
    pub fn expect_starts(&self, count: usize) {
        let mut state = self.shared.state.lock();
        state.sync.expect_starts(count);
        self.shared.sync_cond.notify_all();
    }

    /// 声明接下来将有 `count` 次 `confirm`。
    pub fn expect_confirms(&self, count: usize) {
        let mut state = self.shared.state.lock();
        state.sync.expect_confirms(count);
        self.shared.sync_cond.notify_all();
    }

    /// 阻塞直到全部期望的注册都已发生。
    pub fn wait_for_start(&self) {
        let mut state = self.shared.state.lock();
        while state.sync.starts().outstanding() > 0 {
            self.shared.sync_cond.wait(&mut state);
        }
    }

    /// 阻塞直到全部期望的确认都已发生。
    pub fn wait_for_confirm(&self) {
        let mut state = self.shared.state.lock();
        while state.sync.confirms().outstanding() > 0 {
            self.shared.sync_cond.wait(&mut state);
        }
    }

    /// 依次等待注册与确认。
    pub fn wait(&self) {
        self.wait_for_start();
        self.wait_for_confirm();
    }

    /// 带超时的 [`MockClock::wait_for_start`]，`timeout` 以真实时间计。
    pub fn wait_for_start_timeout(&self, timeout: Duration) -> Result<(), ClockError> {
        self.wait_until_settled("starts", timeout, |sync| sync.starts().outstanding())
    }

    /// 带超时的 [`MockClock::wait_for_confirm`]，`timeout` 以真实时间计。
    pub fn wait_for_confirm_timeout(&self, timeout: Duration) -> Result<(), ClockError> {
        self.wait_until_settled("confirms", timeout, |sync| sync.confirms().outstanding())
    }

    fn wait_until_settled(
        &self,
        what: &'static str,
        timeout: Duration,
        outstanding: impl Fn(&SyncController) -> usize,
    ) -> Result<(), ClockError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            let remaining = outstanding(&state.sync);
            if remaining == 0 {
                return Ok(());
            }
            if self
                .shared
                .sync_cond
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                let remaining = outstanding(&state.sync);
                if remaining == 0 {
                    return Ok(());
                }
                warn!(
                    what,
                    outstanding = remaining,
                    ?timeout,
                    "mock clock wait timed out"
                );
                return Err(ClockError::WaitTimedOut {
                    what,
                    outstanding: remaining,
                });
            }
        }
    }

    /// 尚未兑现的注册期望数量。
    pub fn outstanding_starts(&self) -> usize {
        self.shared.state.lock().sync.starts().outstanding()
    }

    /// 尚未兑现的确认期望数量。
    pub fn outstanding_confirms(&self) -> usize {
        self.shared.state.lock().sync.confirms().outstanding()
    }

    /// 设置或清除快速失败接收端；`None` 时意外活动计入盈余。
    pub fn set_fail_fast(&self, sink: Option<Arc<dyn FailureSink>>) {
        self.shared.state.lock().sync.set_fail_fast(sink);
    }

    /// 最早的待触发时间。
    pub fn next_timer(&self) -> Result<SystemTime, ClockError> {
        self.shared
            .state
            .lock()
            .registry
            .peek_min()
            .map(|(fire_at, _)| fire_at)
            .ok_or(ClockError::NoPendingEvents)
    }

    /// 当前处于激活状态的事件数量。
    pub fn pending_events(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// 在挂载点追加一个钩子，返回的标识可交给 [`remove_hook`](Self::remove_hook) 单独撤下。
    pub fn set_hook(&self, point: HookPoint, hook: Hook) -> HookId {
        self.shared.state.lock().hooks.add(point, hook)
    }

    /// 撤下一次注册的钩子，其他调用方挂在同一挂载点上的钩子不受影响。
    pub fn remove_hook(&self, id: HookId) -> bool {
        self.shared.state.lock().hooks.remove(id)
    }

    pub fn clear_hooks(&self, point: HookPoint) {
        self.shared.state.lock().hooks.clear(point);
    }

    pub fn reset_hooks(&self) {
        self.shared.state.lock().hooks.reset();
    }

    /// 短暂让出真实 CPU 时间，给刚被唤醒的线程运行机会。
    pub(crate) fn optimistic_sched(&self) {
        let pause = self.shared.state.lock().optimistic_sched;
        thread::sleep(pause);
    }

    fn current(&self) -> SystemTime {
        self.shared.state.lock().now
    }

    fn run_hooks(&self, point: HookPoint) {
        let (hooks, now) = {
            let state = self.shared.state.lock();
            (state.hooks.snapshot(point), state.now)
        };
        for hook in hooks {
            hook(now);
        }
    }

    /// 登记事件并把它计为一次注册。
    fn register(&self, kind: EventKind, delay: Duration, sink: Sink) -> VirtualHandle {
        self.run_hooks(HookPoint::BeforeTimer);
        let (id, observation, now, fail_fast) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let id = state.next_id;
            state.next_id += 1;
            let now = state.now;
            match now.checked_add(delay) {
                Some(fire_at) => {
                    state.events.insert(id, TimedEvent::new(kind, fire_at, sink));
                    state.registry.insert(id, fire_at);
                }
                None => {
                    // 不可表示的触发时间永远不会到达，事件以失活状态登记。
                    state.events.insert(id, TimedEvent::new(kind, now, sink));
                }
            }
            let observation = state.sync.record_start();
            (id, observation, now, state.sync.fail_fast())
        };
        trace!(event = id, kind = kind.label(), ?delay, "virtual event registered");

        let unexpected = match kind {
            EventKind::Timer => UnexpectedKind::TimerStart,
            EventKind::Ticker { .. } => UnexpectedKind::TickerStart,
        };
        self.settle(observation, unexpected, now, fail_fast);
        self.run_hooks(HookPoint::AfterTimer);
        VirtualHandle {
            id,
            clock: Arc::downgrade(&self.shared),
        }
    }

    /// 处理一次注册/确认的归类结果；调用时不得持有内部锁。
    fn settle(
        &self,
        observation: Observation,
        kind: UnexpectedKind,
        at: SystemTime,
        fail_fast: Option<Arc<dyn FailureSink>>,
    ) {
        match observation {
            Observation::Consumed { released: true } => {
                self.shared.sync_cond.notify_all();
            }
            Observation::Consumed { released: false } => {}
            Observation::Unexpected => {
                if let Some(sink) = fail_fast {
                    let event = UnexpectedEvent { kind, at };
                    error!(%event, "unexpected clock activity reported to failure sink");
                    sink.report(event);
                }
            }
            Observation::Surplus => {
                debug!(%kind, at = ?at, "unexpected clock activity tolerated as surplus");
            }
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        self.run_hooks(HookPoint::BeforeNow);
        let now = self.current();
        self.run_hooks(HookPoint::AfterNow);
        now
    }

    /// 阻塞直到虚拟时间前进 `duration`；该调用本身计为一次注册。
    fn sleep(&self, duration: Duration) {
        let timer = self.timer(duration);
        let _ = timer.recv();
    }

    fn after_func(&self, duration: Duration, callback: Callback) -> Timer {
        let handle = self.register(EventKind::Timer, duration, Sink::callback(callback));
        Timer::new(None, EventHandle::Virtual(handle))
    }

    fn ticker(&self, period: Duration) -> Ticker {
        assert!(!period.is_zero(), "ticker period must be non-zero");
        let (sink, rx) = Sink::channel();
        let handle = self.register(EventKind::Ticker { period }, period, sink);
        Ticker::new(rx, EventHandle::Virtual(handle))
    }

    fn timer(&self, duration: Duration) -> Timer {
        let (sink, rx) = Sink::channel();
        let handle = self.register(EventKind::Timer, duration, sink);
        Timer::new(Some(rx), EventHandle::Virtual(handle))
    }

    fn confirm(&self) {
        let (observation, now, fail_fast) = {
            let mut state = self.shared.state.lock();
            let observation = state.sync.record_confirm();
            (observation, state.now, state.sync.fail_fast())
        };
        self.settle(observation, UnexpectedKind::Confirmation, now, fail_fast);
    }
}

/// 虚拟事件句柄：以 `Weak` 回指时钟，时钟释放后所有操作均为空操作。
#[derive(Debug)]
pub(crate) struct VirtualHandle {
    id: EventId,
    clock: Weak<Shared>,
}

impl VirtualHandle {
    pub(crate) fn stop(&self) -> bool {
        let Some(shared) = self.clock.upgrade() else {
            return false;
        };
        let mut state = shared.state.lock();
        state.registry.remove(self.id)
    }

    /// 以当前虚拟时间为基准重新布置事件；`period` 仅对节拍器生效。
    pub(crate) fn reset(&self, duration: Duration, period: Option<Duration>) -> bool {
        let Some(shared) = self.clock.upgrade() else {
            return false;
        };
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        let was_active = state.registry.contains(self.id);
        let now = state.now;
        let Some(event) = state.events.get_mut(&self.id) else {
            return was_active;
        };
        match now.checked_add(duration) {
            Some(fire_at) => {
                event.reschedule(fire_at, period);
                state.registry.insert(self.id, fire_at);
            }
            None => {
                state.registry.remove(self.id);
            }
        }
        was_active
    }

    pub(crate) fn confirm(&self) {
        if let Some(shared) = self.clock.upgrade() {
            MockClock { shared }.confirm();
        }
    }
}

impl Drop for VirtualHandle {
    /// 句柄丢弃不取消事件：激活中的事件被标记为可回收，失活事件立即从事件表移除。
    fn drop(&mut self) {
        let Some(shared) = self.clock.upgrade() else {
            return;
        };
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.registry.contains(self.id) {
            if let Some(event) = state.events.get_mut(&self.id) {
                event.detach();
            }
        } else {
            state.events.remove(&self.id);
        }
    }
}
