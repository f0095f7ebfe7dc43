//! 钩子：在读取时间、创建定时器的前后插入测试逻辑。
//!
//! 典型用法是在被测代码读取时间的瞬间推进时钟，复现“读时间与设定时器之间恰好跨过截止点”之类的窄窗口。
//! 钩子在锁外执行，因此可以在钩子内调用 [`MockClock::add`](crate::MockClock::add)。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// 钩子挂载点。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// 被测代码读取时间之前。
    BeforeNow,
    /// 被测代码读取时间之后。
    AfterNow,
    /// 创建定时器/节拍器之前。
    BeforeTimer,
    /// 创建定时器/节拍器之后。
    AfterTimer,
}

/// 钩子以当前虚拟时间为参数。
pub type Hook = Arc<dyn Fn(SystemTime) + Send + Sync + 'static>;

/// 单次注册的标识，供注册方只撤下自己挂上的钩子，而不影响同一挂载点上的其他调用方。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
pub(crate) struct HookTable {
    hooks: HashMap<HookPoint, Vec<(HookId, Hook)>>,
    next_id: u64,
}

impl HookTable {
    pub(crate) fn add(&mut self, point: HookPoint, hook: Hook) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        self.hooks.entry(point).or_default().push((id, hook));
        id
    }

    /// 按标识撤下单个钩子；标识已失效时返回 `false`。
    pub(crate) fn remove(&mut self, id: HookId) -> bool {
        for hooks in self.hooks.values_mut() {
            if let Some(index) = hooks.iter().position(|(hook_id, _)| *hook_id == id) {
                hooks.remove(index);
                return true;
            }
        }
        false
    }

    pub(crate) fn clear(&mut self, point: HookPoint) {
        self.hooks.remove(&point);
    }

    pub(crate) fn reset(&mut self) {
        self.hooks.clear();
    }

    /// 克隆出某个挂载点的全部钩子，调用方在释放锁后再逐个执行。
    pub(crate) fn snapshot(&self, point: HookPoint) -> Vec<Hook> {
        self.hooks
            .get(&point)
            .map(|hooks| hooks.iter().map(|(_, hook)| Arc::clone(hook)).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (point, hooks) in &self.hooks {
            map.entry(point, &hooks.len());
        }
        map.finish()
    }
}
