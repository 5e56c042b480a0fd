//! Postgres 谓词编译器
//!
//! 把谓词代数下推为 JSONB 路径比较的 WHERE 片段：
//! - 原始标量按 `data->$k OP $v::jsonb` 比较，比较值编码为 JSON 字面量参数；
//! - 时间戳把存储的 ISO-8601 字符串转换为可比较的时间戳表达式，
//!   转换策略（原生函数或格式串解析）在引擎启动时一次选定；
//! - 其余值类型是硬错误 `UnsupportedPredicateValueType`，不做静默残余回退。
//!
//! 所有变体都完整下推，残余恒为空；占位符 `$n` 按出现顺序编号，
//! 每次查询使用一个全新的编译器实例。
//!
use chronicle_domain::error::{DomainError, DomainResult as Result};
use chronicle_domain::predicate::{FieldPredicate, FieldValue};
use chronicle_domain::simplify::{PredicateSimplifier, Simplified, simplify_field_predicate};
use chronicle_domain::time;
use std::collections::BTreeMap;

/// 存储字符串到时间戳的转换策略，启动时协商一次后复用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampCast {
    /// 服务端 `fromisoformat` 函数（能力探测成功时）
    IsoFunction,
    /// `to_timestamp` 固定格式串解析（回退）
    FormatParse,
}

impl TimestampCast {
    /// 把文本取值表达式包装为时间戳表达式
    pub fn wrap(&self, expr: &str) -> String {
        match self {
            TimestampCast::IsoFunction => format!("fromisoformat({expr})"),
            TimestampCast::FormatParse => {
                format!(r#"to_timestamp({expr}, 'YYYY-MM-DD"T"HH24:MI:SSTZH:TZM')"#)
            }
        }
    }
}

/// 针对单张表（类型列 + 数据列）的谓词编译器
pub struct PostgresSimplifier {
    type_field: &'static str,
    data_field: &'static str,
    timestamp_cast: TimestampCast,
    next_param: usize,
}

impl PostgresSimplifier {
    pub fn new(
        type_field: &'static str,
        data_field: &'static str,
        timestamp_cast: TimestampCast,
    ) -> Self {
        Self {
            type_field,
            data_field,
            timestamp_cast,
            next_param: 0,
        }
    }

    fn placeholder(&mut self) -> String {
        self.next_param += 1;
        format!("${}", self.next_param)
    }

    /// 值类型导向的单字段比较片段
    fn comparison(
        &mut self,
        field: &str,
        oper: &str,
        value: &FieldValue,
    ) -> Result<(String, Vec<String>)> {
        match value {
            FieldValue::String(_) | FieldValue::Int(_) | FieldValue::Float(_)
            | FieldValue::Bool(_) => {
                let key = self.placeholder();
                let val = self.placeholder();
                Ok((
                    format!("{}->{key} {oper} {val}::jsonb", self.data_field),
                    vec![field.to_string(), value.to_json().to_string()],
                ))
            }
            FieldValue::Timestamp(ts) => {
                let key = self.placeholder();
                let field_as_timestamp = self
                    .timestamp_cast
                    .wrap(&format!("{}->>{key}", self.data_field));
                let val = self.placeholder();
                Ok((
                    format!("{field_as_timestamp} {oper} {val}::timestamptz"),
                    vec![field.to_string(), time::to_iso_utc(ts)],
                ))
            }
            FieldValue::Json(_) => Err(DomainError::UnsupportedPredicateValueType {
                value_type: value.type_name().to_string(),
            }),
        }
    }
}

impl PredicateSimplifier for PostgresSimplifier {
    fn on_is(&mut self, types: &[String]) -> Result<Simplified> {
        if types.is_empty() {
            // 空集合无法写成 IN ()，恒不命中
            return Ok(Simplified::native("FALSE", Vec::new()));
        }
        let placeholders = types
            .iter()
            .map(|_| self.placeholder())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Simplified::native(
            format!("{} IN ({placeholders})", self.type_field),
            types.to_vec(),
        ))
    }

    fn on_where(&mut self, fields: &BTreeMap<String, FieldPredicate>) -> Result<Simplified> {
        let mut exprs = Vec::with_capacity(fields.len());
        let mut params = Vec::new();
        for (name, pred) in fields {
            let simplified = simplify_field_predicate(self, name, pred)?;
            // 字段谓词必须自身完整下推，违反属于实现错误
            assert!(
                simplified.is_fully_lowered(),
                "field predicate for {name:?} did not lower fully"
            );
            exprs.push(simplified.clause.unwrap_or_default());
            params.extend(simplified.params);
        }
        Ok(Simplified::native(
            format!("({})", exprs.join(" AND ")),
            params,
        ))
    }

    fn on_eq(&mut self, field: &str, expect: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, "=", expect)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_not_eq(&mut self, field: &str, expect: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, "<>", expect)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_less(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, "<", limit)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_more(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, ">", limit)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_less_eq(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, "<=", limit)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_more_eq(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified> {
        let (clause, params) = self.comparison(field, ">=", limit)?;
        Ok(Simplified::native(clause, params))
    }

    fn on_between(
        &mut self,
        field: &str,
        lower: &FieldValue,
        upper: &FieldValue,
    ) -> Result<Simplified> {
        let (low_clause, low_params) = self.comparison(field, ">=", lower)?;
        let (hi_clause, hi_params) = self.comparison(field, "<=", upper)?;
        let mut params = low_params;
        params.extend(hi_params);
        Ok(Simplified::native(
            format!("({low_clause} AND {hi_clause})"),
            params,
        ))
    }

    fn on_one_of(&mut self, field: &str, options: &[FieldValue]) -> Result<Simplified> {
        if options.is_empty() {
            return Ok(Simplified::native("FALSE", Vec::new()));
        }
        let mut exprs = Vec::with_capacity(options.len());
        let mut params = Vec::new();
        for option in options {
            let (clause, oparams) = self.comparison(field, "=", option)?;
            exprs.push(clause);
            params.extend(oparams);
        }
        Ok(Simplified::native(
            format!("({})", exprs.join(" OR ")),
            params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_domain::predicate::Predicate;
    use chronicle_domain::simplify::simplify_predicate;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event_simplifier() -> PostgresSimplifier {
        PostgresSimplifier::new("event_type", "event_data", TimestampCast::FormatParse)
    }

    #[test]
    fn is_lowers_to_type_membership() {
        let pred = Predicate::is(["Created", "Renamed"]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert!(simplified.residual.is_none());
        assert_eq!(
            simplified.clause.as_deref(),
            Some("event_type IN ($1, $2)")
        );
        assert_eq!(simplified.params, vec!["Created", "Renamed"]);
    }

    #[test]
    fn scalar_comparison_uses_jsonb_literal_params() {
        let pred = Predicate::where_fields([("owner", FieldPredicate::eq("alice"))]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some("(event_data->$1 = $2::jsonb)")
        );
        assert_eq!(simplified.params, vec!["owner", "\"alice\""]);

        let pred = Predicate::where_fields([("amount", FieldPredicate::more(10))]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some("(event_data->$1 > $2::jsonb)")
        );
        assert_eq!(simplified.params, vec!["amount", "10"]);
    }

    #[test]
    fn between_expands_to_bounded_conjunction() {
        let pred = Predicate::where_fields([("amount", FieldPredicate::between(10, 20))]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some("((event_data->$1 >= $2::jsonb AND event_data->$3 <= $4::jsonb))")
        );
        assert_eq!(simplified.params, vec!["amount", "10", "amount", "20"]);
    }

    #[test]
    fn one_of_expands_to_equality_disjunction() {
        let pred =
            Predicate::where_fields([("status", FieldPredicate::one_of(["open", "frozen"]))]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some("((event_data->$1 = $2::jsonb OR event_data->$3 = $4::jsonb))")
        );
        assert_eq!(
            simplified.params,
            vec!["status", "\"open\"", "status", "\"frozen\""]
        );
    }

    #[test]
    fn multi_field_where_numbers_placeholders_in_order() {
        let pred = Predicate::where_fields([
            ("amount", FieldPredicate::less(100)),
            ("owner", FieldPredicate::eq("alice")),
        ]);
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        // BTreeMap 迭代按字段名排序
        assert_eq!(
            simplified.clause.as_deref(),
            Some("(event_data->$1 < $2::jsonb AND event_data->$3 = $4::jsonb)")
        );
        assert_eq!(
            simplified.params,
            vec!["amount", "100", "owner", "\"alice\""]
        );
    }

    #[test]
    fn timestamp_comparison_uses_the_configured_cast() {
        let cutoff = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let pred = Predicate::where_fields([("at", FieldPredicate::less(cutoff))]);

        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some(
                r#"(to_timestamp(event_data->>$1, 'YYYY-MM-DD"T"HH24:MI:SSTZH:TZM') < $2::timestamptz)"#
            )
        );
        assert_eq!(simplified.params, vec!["at", "2024-06-01T00:00:00+00:00"]);

        let mut native = PostgresSimplifier::new(
            "event_type",
            "event_data",
            TimestampCast::IsoFunction,
        );
        let simplified = simplify_predicate(&mut native, &pred).unwrap();
        assert_eq!(
            simplified.clause.as_deref(),
            Some("(fromisoformat(event_data->>$1) < $2::timestamptz)")
        );
    }

    #[test]
    fn composite_json_values_are_rejected() {
        let pred = Predicate::where_fields([("tags", FieldPredicate::eq(json!(["a"])))]);
        let err = simplify_predicate(&mut event_simplifier(), &pred).unwrap_err();
        match err {
            DomainError::UnsupportedPredicateValueType { value_type } => {
                assert_eq!(value_type, "json");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_membership_sets_never_match() {
        let pred = Predicate::is(Vec::<String>::new());
        let simplified = simplify_predicate(&mut event_simplifier(), &pred).unwrap();
        assert_eq!(simplified.clause.as_deref(), Some("FALSE"));
        assert!(simplified.params.is_empty());
    }
}
