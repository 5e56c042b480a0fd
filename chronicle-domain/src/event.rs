//! 事件定义与事件注册表
//!
//! 事件是具名、不可变、schema 绑定的状态变更记录：
//! - `Event`：类型化事件契约，`TYPE` 为全局唯一注册名；
//! - `EventType`：类型擦除视图，供存储层以「名字 + 负载映射」读写；
//! - `EventRegistry`：名字到事件定义的映射，注册期检查重名，
//!   反序列化时按名字重建类型化事件。
//!
//! 注册在确定性的启动阶段一次完成，返回 `Result` 而非在声明处崩溃；
//! 启动完成后注册表只读。
//!
use crate::error::{DomainError, DomainResult as Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;

/// 类型化事件契约
///
/// `TYPE` 是事件的注册名，也是持久化行中 `event_type` 列的取值。
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

/// 类型擦除的事件视图
///
/// 存储层只依赖「类型名 + 负载映射」，不关心具体事件类型；
/// 处理器分发通过 `as_any` 向下转型回具体类型。
pub trait EventType: Send + Sync {
    /// 事件的注册名
    fn type_name(&self) -> &'static str;

    /// 负载的有序字段映射（JSON 对象）
    fn payload(&self) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

impl<E> EventType for E
where
    E: Event,
{
    fn type_name(&self) -> &'static str {
        E::TYPE
    }

    fn payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for dyn EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventType")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}

pub type BoxedEvent = Box<dyn EventType>;

/// 将类型化事件装箱为类型擦除视图
pub fn boxed<E: Event>(event: E) -> BoxedEvent {
    Box::new(event)
}

type EventConstructor = fn(Value) -> Result<BoxedEvent>;

fn construct<E: Event>(payload: Value) -> Result<BoxedEvent> {
    let event: E = serde_json::from_value(payload)?;
    Ok(Box::new(event))
}

/// 事件注册表：注册名 -> 构造函数
#[derive(Default)]
pub struct EventRegistry {
    by_name: HashMap<&'static str, EventConstructor>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件类型，重名返回 `DuplicateDefinition`
    pub fn register<E: Event>(&mut self) -> Result<()> {
        if self.by_name.contains_key(E::TYPE) {
            return Err(DomainError::DuplicateDefinition {
                name: E::TYPE.to_string(),
            });
        }
        self.by_name.insert(E::TYPE, construct::<E>);
        Ok(())
    }

    /// 按注册名从负载映射重建类型化事件
    pub fn construct_named(&self, name: &str, payload: Value) -> Result<BoxedEvent> {
        let constructor = self.by_name.get(name).ok_or_else(|| DomainError::UnknownType {
            name: name.to_string(),
        })?;
        constructor(payload)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AccountOpened {
        id: String,
        owner: String,
    }
    impl Event for AccountOpened {
        const TYPE: &'static str = "AccountOpened";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct AccountClosed {
        id: String,
    }
    impl Event for AccountClosed {
        const TYPE: &'static str = "AccountClosed";
    }

    // 与 AccountOpened 重名的另一个定义
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct AccountOpenedAgain {
        id: String,
    }
    impl Event for AccountOpenedAgain {
        const TYPE: &'static str = "AccountOpened";
    }

    #[test]
    fn register_and_construct_named() {
        let mut registry = EventRegistry::new();
        registry.register::<AccountOpened>().unwrap();
        registry.register::<AccountClosed>().unwrap();

        let evt = registry
            .construct_named("AccountOpened", json!({ "id": "a1", "owner": "alice" }))
            .unwrap();
        assert_eq!(evt.type_name(), "AccountOpened");

        let typed = evt.as_any().downcast_ref::<AccountOpened>().unwrap();
        assert_eq!(typed.owner, "alice");
        assert_eq!(evt.payload().unwrap(), json!({ "id": "a1", "owner": "alice" }));
    }

    #[test]
    fn duplicate_name_fails_regardless_of_order() {
        let mut registry = EventRegistry::new();
        registry.register::<AccountOpened>().unwrap();
        let err = registry.register::<AccountOpenedAgain>().unwrap_err();
        match err {
            DomainError::DuplicateDefinition { name } => assert_eq!(name, "AccountOpened"),
            other => panic!("unexpected {other:?}"),
        }

        let mut registry = EventRegistry::new();
        registry.register::<AccountOpenedAgain>().unwrap();
        let err = registry.register::<AccountOpened>().unwrap_err();
        assert!(matches!(err, DomainError::DuplicateDefinition { .. }));
    }

    #[test]
    fn unknown_name_fails_at_construction() {
        let registry = EventRegistry::new();
        let err = registry.construct_named("Nope", json!({})).unwrap_err();
        match err {
            DomainError::UnknownType { name } => assert_eq!(name, "Nope"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_surfaces_serde_error() {
        let mut registry = EventRegistry::new();
        registry.register::<AccountOpened>().unwrap();
        let err = registry
            .construct_named("AccountOpened", json!({ "id": 42 }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Serde { .. }));
    }
}
