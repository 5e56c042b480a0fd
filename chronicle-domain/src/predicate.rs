//! 谓词代数
//!
//! 描述「要哪些事件/快照」的不可变表达式树，与后端无关：
//! - `Is`：类型成员关系（类型名属于给定集合）；
//! - `Where`：字段到字段谓词的合取；
//! - 字段谓词：标量比较、区间与集合成员。
//!
//! 谓词可被后端部分编译下推（见 `simplify`），也可通过 `matches`
//! 在进程内对「类型名 + 负载映射」完整求值，两者对同一记录集等价。
//!
//! 求值约定：有序比较只在同类标量间成立（数值对数值、字符串对字符串、
//! 时间戳对可解析的 ISO-8601 字符串）；字段缺失不命中任何字段谓词，
//! 与后端 JSON 取值为 NULL 时比较不命中的行为一致。
//!
use crate::time;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 字段谓词中的比较值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// 任意 JSON 复合值；仅支持相等性，后端无法下推时按约定报错
    Json(Value),
}

impl FieldValue {
    /// 变体名，用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Json(_) => "json",
        }
    }

    /// 按负载编码规则转换为 JSON 值（时间戳编码为 ISO-8601 字符串）
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::from(s.clone()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Bool(b) => Value::from(*b),
            FieldValue::Timestamp(ts) => Value::from(time::to_iso_utc(ts)),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

/// 针对单个字段的谓词
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    Eq(FieldValue),
    NotEq(FieldValue),
    Less(FieldValue),
    More(FieldValue),
    LessEq(FieldValue),
    MoreEq(FieldValue),
    Between {
        lower: FieldValue,
        upper: FieldValue,
    },
    OneOf(Vec<FieldValue>),
}

impl FieldPredicate {
    pub fn eq(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::Eq(value.into())
    }

    pub fn not_eq(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::NotEq(value.into())
    }

    pub fn less(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::Less(value.into())
    }

    pub fn more(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::More(value.into())
    }

    pub fn less_eq(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::LessEq(value.into())
    }

    pub fn more_eq(value: impl Into<FieldValue>) -> Self {
        FieldPredicate::MoreEq(value.into())
    }

    pub fn between(lower: impl Into<FieldValue>, upper: impl Into<FieldValue>) -> Self {
        FieldPredicate::Between {
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    pub fn one_of<I, V>(options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        FieldPredicate::OneOf(options.into_iter().map(Into::into).collect())
    }

    /// 对负载中的实际字段值求值；`None` 表示字段缺失
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            FieldPredicate::Eq(expect) => json_eq(actual, expect),
            FieldPredicate::NotEq(expect) => !json_eq(actual, expect),
            FieldPredicate::Less(limit) => {
                matches!(compare(actual, limit), Some(Ordering::Less))
            }
            FieldPredicate::More(limit) => {
                matches!(compare(actual, limit), Some(Ordering::Greater))
            }
            FieldPredicate::LessEq(limit) => {
                matches!(compare(actual, limit), Some(Ordering::Less | Ordering::Equal))
            }
            FieldPredicate::MoreEq(limit) => matches!(
                compare(actual, limit),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FieldPredicate::Between { lower, upper } => {
                matches!(
                    compare(actual, lower),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(compare(actual, upper), Some(Ordering::Less | Ordering::Equal))
            }
            FieldPredicate::OneOf(options) => options.iter().any(|opt| json_eq(actual, opt)),
        }
    }
}

/// 相等性：数值按数值比较，时间戳按时刻比较，其余按 JSON 值比较
fn json_eq(actual: &Value, expect: &FieldValue) -> bool {
    match expect {
        FieldValue::Int(_) | FieldValue::Float(_) => match (actual.as_f64(), expect.to_json().as_f64())
        {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        FieldValue::Timestamp(ts) => actual
            .as_str()
            .and_then(time::parse_iso_utc)
            .is_some_and(|actual_ts| actual_ts == *ts),
        other => *actual == other.to_json(),
    }
}

/// 有序比较；类型不匹配或不可排序时返回 `None`
fn compare(actual: &Value, bound: &FieldValue) -> Option<Ordering> {
    match bound {
        FieldValue::Int(i) => actual.as_f64()?.partial_cmp(&(*i as f64)),
        FieldValue::Float(f) => actual.as_f64()?.partial_cmp(f),
        FieldValue::String(s) => Some(actual.as_str()?.cmp(s.as_str())),
        FieldValue::Timestamp(ts) => {
            let actual_ts = actual.as_str().and_then(time::parse_iso_utc)?;
            Some(actual_ts.cmp(ts))
        }
        FieldValue::Bool(_) | FieldValue::Json(_) => None,
    }
}

/// 对类型化/打标记录的过滤表达式
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// 类型成员关系：记录的类型名属于给定集合
    Is(Vec<String>),
    /// 字段合取：每个字段各自满足其字段谓词
    Where(BTreeMap<String, FieldPredicate>),
}

impl Predicate {
    pub fn is<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::Is(types.into_iter().map(Into::into).collect())
    }

    pub fn where_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldPredicate)>,
        S: Into<String>,
    {
        Predicate::Where(
            fields
                .into_iter()
                .map(|(name, pred)| (name.into(), pred))
                .collect(),
        )
    }

    /// 进程内求值：对「类型名 + 负载映射」判定是否命中
    pub fn matches(&self, type_name: &str, payload: &Value) -> bool {
        match self {
            Predicate::Is(types) => types.iter().any(|t| t == type_name),
            Predicate::Where(fields) => fields.iter().all(|(name, pred)| {
                pred.matches(payload.as_object().and_then(|obj| obj.get(name)))
            }),
        }
    }
}
