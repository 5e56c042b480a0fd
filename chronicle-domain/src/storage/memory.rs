//! 内存版存储引擎（MemoryStorage）
//!
//! 满足 `Storage` 协议的轻量实现：事件日志是一个有序向量，
//! 快照按聚合身份在原位 upsert、保持插入顺序。谓词不做下推，
//! 整体作为残余在进程内求值（部分下推在此退化为完全保留）。
//! 典型用途：测试环境、示例与本地开发。
//!
use crate::aggregate::{AggregateRegistry, BoxedAggregate};
use crate::error::DomainResult as Result;
use crate::event::{BoxedEvent, EventRegistry};
use crate::predicate::Predicate;
use crate::storage::{Storage, snapshot_identity};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

struct EventRow {
    event_type: String,
    event_data: Value,
}

struct SnapshotRow {
    aggregate_id: String,
    aggregate_type: String,
    aggregate_data: Value,
}

/// 简单的内存存储实现
pub struct MemoryStorage {
    events: Arc<EventRegistry>,
    aggregates: Arc<AggregateRegistry>,
    event_log: RwLock<Vec<EventRow>>,
    snapshots: RwLock<Vec<SnapshotRow>>,
}

impl MemoryStorage {
    /// 重建事件/快照需要查注册表，因此与存储引擎一同注入
    pub fn new(events: Arc<EventRegistry>, aggregates: Arc<AggregateRegistry>) -> Self {
        Self {
            events,
            aggregates,
            event_log: RwLock::new(Vec::new()),
            snapshots: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_events(&self, events: &[BoxedEvent]) -> Result<()> {
        // 先整体序列化，失败时不留下半截追加
        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            rows.push(EventRow {
                event_type: event.type_name().to_string(),
                event_data: event.payload()?,
            });
        }
        self.event_log
            .write()
            .expect("in-memory storage lock poisoned")
            .extend(rows);
        Ok(())
    }

    async fn load_events(&self, query: Option<&Predicate>) -> Result<Vec<BoxedEvent>> {
        let log = self.event_log.read().expect("in-memory storage lock poisoned");
        let mut out = Vec::new();
        for row in log.iter() {
            if !query.is_none_or(|pred| pred.matches(&row.event_type, &row.event_data)) {
                continue;
            }
            out.push(self.events.construct_named(&row.event_type, row.event_data.clone())?);
        }
        Ok(out)
    }

    async fn save_snapshots(&self, snapshots: &[BoxedAggregate]) -> Result<()> {
        let mut rows = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            rows.push(SnapshotRow {
                aggregate_id: snapshot_identity(snapshot.type_name(), &snapshot.aggregate_id()),
                aggregate_type: snapshot.type_name().to_string(),
                aggregate_data: snapshot.payload()?,
            });
        }

        let mut stored = self.snapshots.write().expect("in-memory storage lock poisoned");
        for row in rows {
            match stored.iter_mut().find(|s| s.aggregate_id == row.aggregate_id) {
                // 冲突时仅覆盖负载列，保持插入位置不变
                Some(existing) => existing.aggregate_data = row.aggregate_data,
                None => stored.push(row),
            }
        }
        Ok(())
    }

    async fn load_snapshots(&self, query: Option<&Predicate>) -> Result<Vec<BoxedAggregate>> {
        let stored = self.snapshots.read().expect("in-memory storage lock poisoned");
        let mut out = Vec::new();
        for row in stored.iter() {
            if !query.is_none_or(|pred| pred.matches(&row.aggregate_type, &row.aggregate_data)) {
                continue;
            }
            out.push(
                self.aggregates
                    .construct_named(&row.aggregate_type, row.aggregate_data.clone())?,
            );
        }
        Ok(out)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
