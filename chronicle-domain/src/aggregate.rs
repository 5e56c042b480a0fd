//! 聚合定义、分发表与回放引擎
//!
//! 聚合是领域实体：状态不以可变行存储，而是从创建事件开始，
//! 按顺序折叠其事件流重建。本模块提供：
//! - `Aggregate`：类型化聚合契约（类型名、id 字段、创建事件、身份）；
//! - `AggregateType`：声明期校验过的每类型定义——事件名到处理器的
//!   O(1) 分发表，加上批量加载器入口；
//! - 回放操作：`apply_event` / `from_events` / `load` / `load_all`；
//! - `AggregateRegistry`：快照反序列化用的名字到定义映射。
//!
//! 定义校验（id 字段、创建事件处理器、加载器）在 `build()` 时一次完成，
//! 失败是致命的声明错误，不推迟到首次使用。
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::event::{BoxedEvent, Event, EventType};
use crate::predicate::{FieldPredicate, Predicate};
use crate::storage::Storage;
use futures_core::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;

/// 类型化聚合契约
///
/// 回放从 `Default` 的空白实例开始；第一个事件必须是 `Creation` 声明的
/// 创建事件，此后实例才视为已物化。
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    /// 身份字段在 schema 中的名字
    const ID_FIELD: &'static str = "id";

    /// 声明的创建事件类型（每个聚合类型恰好一个）
    type Creation: Event;

    /// 当前实例的身份值
    fn aggregate_id(&self) -> String;
}

/// 类型擦除的聚合视图，供快照读写使用
pub trait AggregateState: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn aggregate_id(&self) -> String;

    /// 快照负载的有序字段映射（JSON 对象）
    fn payload(&self) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

impl<A> AggregateState for A
where
    A: Aggregate,
{
    fn type_name(&self) -> &'static str {
        A::TYPE
    }

    fn aggregate_id(&self) -> String {
        Aggregate::aggregate_id(self)
    }

    fn payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for dyn AggregateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateState")
            .field("type_name", &self.type_name())
            .field("aggregate_id", &self.aggregate_id())
            .finish_non_exhaustive()
    }
}

pub type BoxedAggregate = Box<dyn AggregateState>;

/// 将类型化聚合装箱为类型擦除视图
pub fn boxed<A: Aggregate>(aggregate: A) -> BoxedAggregate {
    Box::new(aggregate)
}

/// 加载器返回值：id -> 该聚合的有序事件列表
pub type LoadedEvents = HashMap<String, Vec<BoxedEvent>>;

type Handler<A> = Box<dyn Fn(&mut A, &dyn EventType) -> Result<()> + Send + Sync>;

type Loader = Box<
    dyn for<'a> Fn(&'a dyn Storage, &'a [String]) -> BoxFuture<'a, Result<LoadedEvents>>
        + Send
        + Sync,
>;

/// 声明期校验过的聚合类型定义：分发表 + 加载器
pub struct AggregateType<A>
where
    A: Aggregate,
{
    handlers: HashMap<&'static str, Handler<A>>,
    loader: Loader,
}

impl<A> std::fmt::Debug for AggregateType<A>
where
    A: Aggregate,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateType")
            .field("aggregate", &A::TYPE)
            .field("handled_events", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<A> AggregateType<A>
where
    A: Aggregate,
{
    pub fn builder() -> AggregateTypeBuilder<A> {
        AggregateTypeBuilder {
            handlers: HashMap::new(),
            loader: None,
        }
    }

    /// 查分发表并调用处理器；表中无此事件类型时报 `UnhandledEventType`
    pub fn apply_event(&self, aggregate: &mut A, event: &dyn EventType) -> Result<()> {
        let handler =
            self.handlers
                .get(event.type_name())
                .ok_or_else(|| DomainError::UnhandledEventType {
                    aggregate: A::TYPE.to_string(),
                    event_type: event.type_name().to_string(),
                })?;
        handler(aggregate, event)
    }

    /// 从有序事件序列折叠出聚合实例
    ///
    /// 空序列或首事件不是声明的创建事件时报 `InvalidAggregateState`。
    pub fn from_events(&self, events: &[BoxedEvent]) -> Result<A> {
        let first = events
            .first()
            .ok_or_else(|| DomainError::InvalidAggregateState {
                reason: format!("{}: empty event sequence", A::TYPE),
            })?;
        if first.type_name() != A::Creation::TYPE {
            return Err(DomainError::InvalidAggregateState {
                reason: format!(
                    "{}: first event must be {}, got {}",
                    A::TYPE,
                    A::Creation::TYPE,
                    first.type_name()
                ),
            });
        }

        let mut aggregate = A::default();
        for event in events {
            self.apply_event(&mut aggregate, event.as_ref())?;
        }
        Ok(aggregate)
    }

    /// 加载单个聚合；无任何事件时报 `NotFound`
    pub async fn load(&self, storage: &dyn Storage, id: &str) -> Result<A> {
        let ids = [id.to_string()];
        let mut loaded = (self.loader)(storage, &ids).await?;
        let events = loaded.remove(id).unwrap_or_default();
        if events.is_empty() {
            return Err(DomainError::NotFound {
                reason: format!("no {} with id {id}", A::TYPE),
            });
        }
        self.from_events(&events)
    }

    /// 批量加载；没有事件的 id 被静默省略，需要感知缺失的调用方自行求差集
    pub async fn load_all(&self, storage: &dyn Storage, ids: &[String]) -> Result<Vec<A>> {
        let loaded = (self.loader)(storage, ids).await?;
        let mut aggregates = Vec::with_capacity(loaded.len());
        for id in ids {
            match loaded.get(id) {
                Some(events) if !events.is_empty() => aggregates.push(self.from_events(events)?),
                _ => {}
            }
        }
        Ok(aggregates)
    }
}

/// `AggregateType` 构建器；`build()` 执行全部声明期校验
pub struct AggregateTypeBuilder<A>
where
    A: Aggregate,
{
    handlers: HashMap<&'static str, Handler<A>>,
    loader: Option<Loader>,
}

impl<A> AggregateTypeBuilder<A>
where
    A: Aggregate,
{
    /// 为事件类型 `E` 注册处理器
    pub fn handles<E: Event>(mut self, apply: fn(&mut A, &E)) -> Self {
        self.handlers.insert(
            E::TYPE,
            Box::new(move |aggregate, event| {
                let event = event.as_any().downcast_ref::<E>().ok_or_else(|| {
                    DomainError::TypeMismatch {
                        expected: E::TYPE.to_string(),
                        found: event.type_name().to_string(),
                    }
                })?;
                apply(aggregate, event);
                Ok(())
            }),
        );
        self
    }

    /// 注册加载器入口：给定存储与 id 集合，返回 id 到有序事件列表的映射
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Storage, &'a [String]) -> BoxFuture<'a, Result<LoadedEvents>>
            + Send
            + Sync
            + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn build(self) -> Result<AggregateType<A>> {
        if A::ID_FIELD.is_empty() {
            return Err(definition_error::<A>("id field name must be non-empty"));
        }
        let blank = serde_json::to_value(A::default())?;
        let has_id_field = blank
            .as_object()
            .is_some_and(|fields| fields.contains_key(A::ID_FIELD));
        if !has_id_field {
            return Err(definition_error::<A>(&format!(
                "id field {:?} missing from schema",
                A::ID_FIELD
            )));
        }

        if !self.handlers.contains_key(A::Creation::TYPE) {
            return Err(definition_error::<A>(&format!(
                "missing handler for creation event {}",
                A::Creation::TYPE
            )));
        }

        let Some(loader) = self.loader else {
            return Err(definition_error::<A>("missing loader"));
        };

        Ok(AggregateType {
            handlers: self.handlers,
            loader,
        })
    }
}

fn definition_error<A: Aggregate>(problem: &str) -> DomainError {
    DomainError::AggregateDefinition {
        aggregate: A::TYPE.to_string(),
        problem: problem.to_string(),
    }
}

/// 常用加载器：按 id 字段过滤事件并按 id 分组
///
/// 下推 `Where(id_field: OneOf(ids))`，取回后只保留给定事件类型，
/// 事件在每个分组内保持存储的 `sequence_num` 顺序。
pub fn events_by_id_loader(
    event_types: &'static [&'static str],
    id_field: &'static str,
) -> impl for<'a> Fn(&'a dyn Storage, &'a [String]) -> BoxFuture<'a, Result<LoadedEvents>>
+ Send
+ Sync
+ 'static {
    move |storage, ids| {
        Box::pin(async move {
            let query = Predicate::where_fields([(
                id_field,
                FieldPredicate::one_of(ids.iter().map(String::as_str)),
            )]);
            let events = storage.load_events(Some(&query)).await?;

            let mut grouped = LoadedEvents::new();
            for event in events {
                if !event_types.contains(&event.type_name()) {
                    continue;
                }
                let payload = event.payload()?;
                let Some(id) = payload.get(id_field).map(id_value_to_string) else {
                    continue;
                };
                if ids.contains(&id) {
                    grouped.entry(id).or_default().push(event);
                }
            }
            Ok(grouped)
        })
    }
}

fn id_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

type AggregateConstructor = fn(Value) -> Result<BoxedAggregate>;

fn construct<A: Aggregate>(payload: Value) -> Result<BoxedAggregate> {
    let aggregate: A = serde_json::from_value(payload)?;
    Ok(Box::new(aggregate))
}

/// 聚合注册表：注册名 -> 快照构造函数
#[derive(Default)]
pub struct AggregateRegistry {
    by_name: HashMap<&'static str, AggregateConstructor>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册聚合类型，重名返回 `DuplicateDefinition`
    pub fn register<A: Aggregate>(&mut self) -> Result<()> {
        if self.by_name.contains_key(A::TYPE) {
            return Err(DomainError::DuplicateDefinition {
                name: A::TYPE.to_string(),
            });
        }
        self.by_name.insert(A::TYPE, construct::<A>);
        Ok(())
    }

    /// 按注册名从快照负载重建聚合实例
    pub fn construct_named(&self, name: &str, payload: Value) -> Result<BoxedAggregate> {
        let constructor = self.by_name.get(name).ok_or_else(|| DomainError::UnknownType {
            name: name.to_string(),
        })?;
        constructor(payload)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
