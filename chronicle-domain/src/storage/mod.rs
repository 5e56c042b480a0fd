//! 存储协议
//!
//! 存储引擎拥有连接池与事务作用域，对外暴露四个操作：
//! 追加事件、加载事件、保存快照、加载快照。事件日志只追加，
//! 回放顺序以 `sequence_num` 为唯一事实来源；快照按聚合身份 upsert。
//!
//! 查询谓词由各后端自行编译下推，残余部分对取回的记录进程内求值，
//! 因此无论后端表达能力如何，过滤语义都是精确的。
//!
mod memory;

pub use memory::MemoryStorage;

use crate::aggregate::BoxedAggregate;
use crate::error::DomainResult as Result;
use crate::event::BoxedEvent;
use crate::predicate::Predicate;
use async_trait::async_trait;
use std::sync::Arc;

/// 存储引擎协议
#[async_trait]
pub trait Storage: Send + Sync {
    /// 按调用顺序追加事件；插入顺序决定 `sequence_num` 顺序
    async fn save_events(&self, events: &[BoxedEvent]) -> Result<()>;

    /// 按 `sequence_num` 升序加载命中谓词的事件
    async fn load_events(&self, query: Option<&Predicate>) -> Result<Vec<BoxedEvent>>;

    /// 按聚合身份 `"{Type}:{id}"` upsert 快照，后写胜出
    async fn save_snapshots(&self, snapshots: &[BoxedAggregate]) -> Result<()>;

    /// 按插入顺序加载命中谓词的快照
    async fn load_snapshots(&self, query: Option<&Predicate>) -> Result<Vec<BoxedAggregate>>;

    /// 幂等关闭底层连接资源
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    async fn save_events(&self, events: &[BoxedEvent]) -> Result<()> {
        (**self).save_events(events).await
    }

    async fn load_events(&self, query: Option<&Predicate>) -> Result<Vec<BoxedEvent>> {
        (**self).load_events(query).await
    }

    async fn save_snapshots(&self, snapshots: &[BoxedAggregate]) -> Result<()> {
        (**self).save_snapshots(snapshots).await
    }

    async fn load_snapshots(&self, query: Option<&Predicate>) -> Result<Vec<BoxedAggregate>> {
        (**self).load_snapshots(query).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// 快照行的聚合身份串
pub fn snapshot_identity(aggregate_type: &str, aggregate_id: &str) -> String {
    format!("{aggregate_type}:{aggregate_id}")
}
