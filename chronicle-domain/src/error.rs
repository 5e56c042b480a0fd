//! 领域层统一错误定义
//!
//! 聚焦类型注册、聚合回放、谓词编译与存储访问的最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 类型注册与定义 ---
    #[error("duplicate definition: {name}")]
    DuplicateDefinition { name: String },
    #[error("unknown type: {name}")]
    UnknownType { name: String },
    #[error("invalid aggregate definition: {aggregate}: {problem}")]
    AggregateDefinition { aggregate: String, problem: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 回放 ---
    #[error("invalid aggregate state: {reason}")]
    InvalidAggregateState { reason: String },
    #[error("unhandled event type: {aggregate} has no handler for {event_type}")]
    UnhandledEventType {
        aggregate: String,
        event_type: String,
    },

    // --- 谓词编译 ---
    #[error("unsupported predicate value type: {value_type}")]
    UnsupportedPredicateValueType { value_type: String },

    // --- 存储 ---
    #[error("not found: {reason}")]
    NotFound { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}
