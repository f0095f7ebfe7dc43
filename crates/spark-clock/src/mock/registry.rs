//! 待触发事件的有序注册表。
//!
//! # 教案式说明
//! - **意图 (Why)**：推进算法每一步都需要“取出最早到期的事件”，同时 `stop`/`reset` 需要删除任意事件；
//! - **契约 (What)**：
//!   - `peek_min`/`pop_min` 总是返回 `fire_at` 最小的事件；
//!   - `fire_at` 相同时按插入顺序（稳定、可复现）出队；
//!   - 删除未知事件是静默的空操作；重复插入同一事件等价于“先删除再插入”；
//! - **实现 (How)**：`BTreeMap<(fire_at, seq), id>` 维护顺序，`HashMap<id, key>` 支撑 O(log n) 的任意删除。

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use super::event::EventId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SlotKey {
    fire_at: SystemTime,
    seq: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EventRegistry {
    order: BTreeMap<SlotKey, EventId>,
    slots: HashMap<EventId, SlotKey>,
    next_seq: u64,
}

impl EventRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: EventId, fire_at: SystemTime) {
        self.remove(id);
        let key = SlotKey {
            fire_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.order.insert(key, id);
        self.slots.insert(id, key);
    }

    /// 删除事件，返回它此前是否在注册表中。
    pub(crate) fn remove(&mut self, id: EventId) -> bool {
        match self.slots.remove(&id) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: EventId) -> bool {
        self.slots.contains_key(&id)
    }

    pub(crate) fn peek_min(&self) -> Option<(SystemTime, EventId)> {
        self.order
            .first_key_value()
            .map(|(key, id)| (key.fire_at, *id))
    }

    pub(crate) fn pop_min(&mut self) -> Option<(SystemTime, EventId)> {
        let (key, id) = self.order.pop_first()?;
        self.slots.remove(&id);
        Some((key.fire_at, id))
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
