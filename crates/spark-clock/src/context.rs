//! 绑定到可注入时钟的截止上下文。
//!
//! # 教案式说明
//! - **意图 (Why)**：请求级超时通常以“截止时间 + 取消信号”传递给下游；若截止判断依赖系统时间，
//!   测试就无法覆盖超时分支。本模块让截止计时走 [`Clock::after_func`]，在虚拟时钟上完全可控；
//! - **契约 (What)**：
//!   - 上下文只结束一次，结束原因为 [`ContextError::Canceled`] 或 [`ContextError::DeadlineExceeded`]；
//!   - 截止时间已过时，上下文在创建时即以 `DeadlineExceeded` 结束；
//!   - 父上下文结束时，所有仍存活的子上下文以父上下文的原因结束；
//!   - 父上下文的截止时间更早时，子上下文沿用父上下文的截止时间；
//! - **实现 (How)**：父节点只持有子节点的 `Weak` 引用，截止回调同样只持有 `Weak`，
//!   上下文被全部释放后不会因计时器而延长生命周期。
//!
//! 在虚拟时钟上，每个带截止时间的上下文都会创建一个定时器，计为一次注册。

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::clock::{Clock, Timer};
use crate::error::ContextError;

/// 可被取消、可带截止时间的上下文。克隆得到的实例共享同一状态。
#[derive(Clone, Debug)]
pub struct DeadlineContext {
    inner: Arc<ContextInner>,
}

/// 取消对应的上下文；对已结束的上下文调用是空操作。
#[derive(Debug)]
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    deadline: Option<SystemTime>,
    state: Mutex<ContextState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct ContextState {
    err: Option<ContextError>,
    children: Vec<Weak<ContextInner>>,
    timer: Option<Timer>,
}

impl ContextInner {
    fn new(deadline: Option<SystemTime>) -> Arc<Self> {
        Arc::new(Self {
            deadline,
            state: Mutex::new(ContextState::default()),
            cond: Condvar::new(),
        })
    }

    /// 结束上下文并级联到子上下文；重复调用保留第一次的原因。
    fn finish(&self, err: ContextError) {
        let (children, timer) = {
            let mut state = self.state.lock();
            if state.err.is_some() {
                return;
            }
            state.err = Some(err);
            self.cond.notify_all();
            (std::mem::take(&mut state.children), state.timer.take())
        };
        debug!(%err, deadline = ?self.deadline, "deadline context finished");

        if let Some(timer) = timer {
            timer.stop();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.finish(err);
        }
    }

    /// 把子上下文挂到当前上下文；当前上下文已结束时返回其原因，由调用方立即结束子上下文。
    fn adopt(&self, child: &Arc<ContextInner>) -> Option<ContextError> {
        let mut state = self.state.lock();
        if let Some(err) = state.err {
            return Some(err);
        }
        state.children.retain(|existing| existing.strong_count() > 0);
        state.children.push(Arc::downgrade(child));
        None
    }
}

impl DeadlineContext {
    /// 阻塞直到上下文结束，返回结束原因。
    pub fn done(&self) -> ContextError {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(err) = state.err {
                return err;
            }
            self.inner.cond.wait(&mut state);
        }
    }

    /// 最多阻塞 `timeout`（真实时间），期满仍未结束时返回 `None`。
    pub fn done_timeout(&self, timeout: Duration) -> Option<ContextError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.err.is_none() {
            if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.err
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.lock().err.is_some()
    }

    /// 结束原因；尚未结束时为 `None`。
    pub fn err(&self) -> Option<ContextError> {
        self.inner.state.lock().err
    }

    /// 生效的截止时间（已与父上下文取较早者）。
    pub fn deadline(&self) -> Option<SystemTime> {
        self.inner.deadline
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.finish(ContextError::Canceled);
    }
}

/// 创建仅可取消、不带自身截止时间的上下文；存在父上下文时沿用其截止时间。
pub fn with_cancel(parent: Option<&DeadlineContext>) -> (DeadlineContext, CancelHandle) {
    let inner = ContextInner::new(parent.and_then(DeadlineContext::deadline));
    link(parent, &inner);
    pair(inner)
}

/// 创建在 `deadline` 到达时结束的上下文。
pub fn with_deadline(
    clock: &dyn Clock,
    parent: Option<&DeadlineContext>,
    deadline: SystemTime,
) -> (DeadlineContext, CancelHandle) {
    let effective = match parent.and_then(DeadlineContext::deadline) {
        Some(inherited) if inherited < deadline => inherited,
        _ => deadline,
    };
    let inner = ContextInner::new(Some(effective));
    if link(parent, &inner) {
        return pair(inner);
    }

    let remaining = effective
        .duration_since(clock.now())
        .unwrap_or(Duration::ZERO);
    if remaining.is_zero() {
        inner.finish(ContextError::DeadlineExceeded);
        return pair(inner);
    }

    let weak = Arc::downgrade(&inner);
    let timer = clock.after_func(
        remaining,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.finish(ContextError::DeadlineExceeded);
            }
        }),
    );
    let mut state = inner.state.lock();
    if state.err.is_some() {
        drop(state);
        timer.stop();
    } else {
        state.timer = Some(timer);
        drop(state);
    }
    pair(inner)
}

/// 创建在 `timeout` 之后结束的上下文。
pub fn with_timeout(
    clock: &dyn Clock,
    parent: Option<&DeadlineContext>,
    timeout: Duration,
) -> (DeadlineContext, CancelHandle) {
    match clock.now().checked_add(timeout) {
        Some(deadline) => with_deadline(clock, parent, deadline),
        // 不可表示的截止时间永远不会到达。
        None => with_cancel(parent),
    }
}

/// 挂到父上下文；父上下文已结束时立即结束子上下文并返回 `true`。
fn link(parent: Option<&DeadlineContext>, inner: &Arc<ContextInner>) -> bool {
    let Some(parent) = parent else {
        return false;
    };
    match parent.inner.adopt(inner) {
        Some(err) => {
            inner.finish(err);
            true
        }
        None => false,
    }
}

fn pair(inner: Arc<ContextInner>) -> (DeadlineContext, CancelHandle) {
    (
        DeadlineContext {
            inner: Arc::clone(&inner),
        },
        CancelHandle { inner },
    )
}
