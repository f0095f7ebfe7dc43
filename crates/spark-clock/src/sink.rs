//! 定时事件的结果投递端：容量为 1 的通道或同步回调，两者互斥。
//!
//! # 教案式说明
//! - **意图 (Why)**：虚拟时钟与系统时钟共享同一套投递语义，避免两份实现对“满则丢弃”的理解出现偏差；
//! - **契约 (What)**：
//!   - 通道投递一律使用 `try_send`，推进时间的线程绝不会因消费者未读取而阻塞；
//!   - 回调在调用方线程上同步执行，调用前必须已释放时钟内部锁；
//! - **实现 (How)**：持锁阶段只克隆出 [`Delivery`]，释放锁后再调用 [`Delivery::run`]。

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::time::SystemTime;

/// `after_func` 注册的回调类型。
///
/// - 回调可能因 `reset` 被多次触发，因此不能是 `FnOnce`；
/// - 回调可能在自身执行期间经嵌套推进再次触发，因此要求 `Fn + Sync`，投递时不持有任何锁。
///   需要可变状态的回调请自行在闭包内使用 `Mutex`/原子类型，并避免跨越 `add` 持锁。
pub type Callback = Box<dyn Fn() + Send + Sync + 'static>;

/// 每个定时事件的结果通道容量。
pub(crate) const SINK_CAPACITY: usize = 1;

#[derive(Clone)]
pub(crate) enum Sink {
    Channel(SyncSender<SystemTime>),
    Callback(Arc<dyn Fn() + Send + Sync + 'static>),
}

impl Sink {
    /// 创建通道投递端，同时返回交给消费者的接收端。
    pub(crate) fn channel() -> (Self, Receiver<SystemTime>) {
        let (tx, rx) = sync_channel(SINK_CAPACITY);
        (Sink::Channel(tx), rx)
    }

    pub(crate) fn callback(callback: Callback) -> Self {
        Sink::Callback(Arc::from(callback))
    }

    /// 在持锁阶段生成一次投递动作，真正的投递留给锁外执行。
    pub(crate) fn delivery(&self, at: SystemTime) -> Delivery {
        match self {
            Sink::Channel(tx) => Delivery::Send {
                tx: tx.clone(),
                at,
            },
            Sink::Callback(callback) => Delivery::Invoke(Arc::clone(callback)),
        }
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Channel(_) => f.write_str("Sink::Channel"),
            Sink::Callback(_) => f.write_str("Sink::Callback"),
        }
    }
}

/// 一次待执行的投递动作。
pub(crate) enum Delivery {
    Send { tx: SyncSender<SystemTime>, at: SystemTime },
    Invoke(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// 投递结果，仅用于诊断日志。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeliveryOutcome {
    Delivered,
    /// 上一次的值仍未被读取，本次值被丢弃。
    Dropped,
    /// 接收端已被释放。
    Disconnected,
    Invoked,
}

impl Delivery {
    pub(crate) fn run(self) -> DeliveryOutcome {
        match self {
            Delivery::Send { tx, at } => match tx.try_send(at) {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(TrySendError::Full(_)) => DeliveryOutcome::Dropped,
                Err(TrySendError::Disconnected(_)) => DeliveryOutcome::Disconnected,
            },
            Delivery::Invoke(callback) => {
                callback();
                DeliveryOutcome::Invoked
            }
        }
    }
}
