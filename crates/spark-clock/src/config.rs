//! 虚拟时钟的声明式配置与构建器。
//!
//! # 教案式说明
//! - **意图 (Why)**：集成测试套件往往共享一份时钟设定（起始时间、是否同步、是否快速失败），
//!   以 TOML 描述可以让多组测试复用同一份夹具；
//! - **契约 (What)**：
//!   - [`MockClockConfig`] 的所有字段均有默认值，空文档等价于 [`MockClock::new`]；
//!   - 未知字段直接报错，避免拼写错误被静默忽略；
//!   - 解析失败统一映射为 [`ClockError::Config`]；
//! - **实现 (How)**：配置与构建器最终都汇总为同一份构造参数，二者不会出现行为分叉。

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::ClockError;
use crate::mock::{FailureSink, MockClock, MockClockParts, PanicSink};

/// 虚拟时钟配置。
///
/// ```toml
/// start_unix_nanos = 1_000_000_000
/// synchronized = true
/// expected_starts = 2
/// fail_on_unexpected = true
/// optimistic_sched_micros = 500
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockClockConfig {
    /// 起始时间，自 Unix 纪元起的纳秒数。
    pub start_unix_nanos: u64,
    /// 每次推进前等待注册、推进后等待确认。
    pub synchronized: bool,
    /// 构造时预先声明的注册数量。
    pub expected_starts: usize,
    /// 意外注册/确认直接 panic。
    pub fail_on_unexpected: bool,
    /// `OptimisticSched` 让出的真实时长（微秒）。
    pub optimistic_sched_micros: u64,
}

impl Default for MockClockConfig {
    fn default() -> Self {
        Self {
            start_unix_nanos: 0,
            synchronized: false,
            expected_starts: 0,
            fail_on_unexpected: false,
            optimistic_sched_micros: 1_000,
        }
    }
}

impl MockClockConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(raw: &str) -> Result<Self, ClockError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn start_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_nanos(self.start_unix_nanos)
    }

    pub fn optimistic_sched(&self) -> Duration {
        Duration::from_micros(self.optimistic_sched_micros)
    }
}

/// [`MockClock`] 构建器。
///
/// ```
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
/// use spark_clock::{Clock, FailureLog, MockClock};
///
/// let log = Arc::new(FailureLog::new());
/// let clock = MockClock::builder()
///     .start_at(SystemTime::UNIX_EPOCH + Duration::from_secs(60))
///     .fail_fast(log.clone())
///     .build();
/// let _timer = clock.timer(Duration::from_secs(1));
/// assert_eq!(log.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockClockBuilder {
    parts: MockClockParts,
}

impl MockClockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以配置为初值创建构建器，之后仍可逐项覆盖。
    pub fn from_config(config: &MockClockConfig) -> Self {
        let fail_fast: Option<Arc<dyn FailureSink>> = if config.fail_on_unexpected {
            Some(Arc::new(PanicSink))
        } else {
            None
        };
        Self {
            parts: MockClockParts {
                start: config.start_time(),
                synchronized: config.synchronized,
                expected_starts: config.expected_starts,
                fail_fast,
                optimistic_sched: config.optimistic_sched(),
            },
        }
    }

    pub fn start_at(mut self, start: SystemTime) -> Self {
        self.parts.start = start;
        self
    }

    pub fn synchronized(mut self, synchronized: bool) -> Self {
        self.parts.synchronized = synchronized;
        self
    }

    pub fn expect_starts(mut self, count: usize) -> Self {
        self.parts.expected_starts = count;
        self
    }

    pub fn fail_fast(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.parts.fail_fast = Some(sink);
        self
    }

    pub fn optimistic_sched(mut self, pause: Duration) -> Self {
        self.parts.optimistic_sched = pause;
        self
    }

    pub fn build(self) -> MockClock {
        MockClock::from_parts(self.parts)
    }
}
