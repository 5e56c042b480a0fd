//! 事件溯源领域层基础库（chronicle-domain）
//!
//! 聚合不以可变行存储，而是通过回放一条有序、只追加的不可变事件日志重建；
//! 快照用于加速重建。本 crate 提供与存储后端解耦的核心构件：
//! - 事件定义与事件注册表（`event`）；
//! - 聚合定义校验、分发表与回放引擎（`aggregate`）；
//! - 谓词代数与进程内求值（`predicate`）；
//! - 谓词部分下推（simplify）协议（`simplify`）；
//! - 存储协议与内存实现（`storage`）。
//!
//! 具体存储后端（例如 Postgres）由上层 crate 提供实现并注入。
//!
//! 典型用法：
//! 1. 在启动阶段将事件与聚合类型注册到 `EventRegistry`/`AggregateRegistry`；
//! 2. 通过 `AggregateType::builder()` 声明处理器分发表与加载器并完成校验；
//! 3. 选择一个 `Storage` 实现，追加事件、加载并回放、读写快照；
//! 4. 需要过滤时用 `Predicate` 描述条件，由后端编译下推、残余部分进程内求值。
//!
pub mod aggregate;
pub mod error;
pub mod event;
pub mod predicate;
pub mod simplify;
pub mod storage;
pub mod time;
