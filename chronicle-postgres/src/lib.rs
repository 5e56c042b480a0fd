//! Postgres 存储后端（chronicle-postgres）
//!
//! 为 `chronicle-domain` 的 `Storage` 协议提供关系型实现：
//! - 谓词编译器（`simplifier`）：把谓词代数完整下推为带类型的、
//!   JSON 路径取值的 WHERE 片段与参数表；
//! - 存储引擎（`storage`）：连接池生命周期、幂等建表、事务作用域
//!   与四个读写操作。
//!
pub mod simplifier;
pub mod storage;

pub use simplifier::{PostgresSimplifier, TimestampCast};
pub use storage::{PostgresConfig, PostgresStorage};
