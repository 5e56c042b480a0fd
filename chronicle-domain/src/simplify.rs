//! 谓词部分下推（simplify）协议
//!
//! 后端适配器对谓词树做部分编译：能原生表达的部分产出查询片段与参数，
//! 不能表达的部分作为残余谓词返回，由引擎在取回行后进程内补齐求值。
//! 每个变体对应一个访问方法，统一返回
//! `(残余谓词 | 无, 原生片段 | 无, 有序参数表)` 三元组。
//!
//! 约定：`Is` 与 `Where` 必须完整下推；`Where` 的每个字段谓词都必须
//! 自身完整下推，违反属于适配器实现错误。
//!
use crate::error::DomainResult as Result;
use crate::predicate::{FieldPredicate, FieldValue, Predicate};
use std::collections::BTreeMap;

/// 部分编译结果三元组
#[derive(Debug, Clone, PartialEq)]
pub struct Simplified {
    /// 后端无法表达、需进程内补齐求值的残余谓词
    pub residual: Option<Predicate>,
    /// 原生查询片段（WHERE 子句的一部分）
    pub clause: Option<String>,
    /// 片段按出现顺序引用的参数
    pub params: Vec<String>,
}

impl Simplified {
    /// 完整下推：只有原生片段，无残余
    pub fn native(clause: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            residual: None,
            clause: Some(clause.into()),
            params,
        }
    }

    /// 完全保留：整个谓词作为残余，进程内求值
    pub fn residual(predicate: Predicate) -> Self {
        Self {
            residual: Some(predicate),
            clause: None,
            params: Vec::new(),
        }
    }

    pub fn is_fully_lowered(&self) -> bool {
        self.residual.is_none() && self.clause.is_some()
    }
}

/// 后端谓词适配器：每个谓词变体一个方法
pub trait PredicateSimplifier {
    fn on_is(&mut self, types: &[String]) -> Result<Simplified>;

    fn on_where(&mut self, fields: &BTreeMap<String, FieldPredicate>) -> Result<Simplified>;

    fn on_eq(&mut self, field: &str, expect: &FieldValue) -> Result<Simplified>;

    fn on_not_eq(&mut self, field: &str, expect: &FieldValue) -> Result<Simplified>;

    fn on_less(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified>;

    fn on_more(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified>;

    fn on_less_eq(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified>;

    fn on_more_eq(&mut self, field: &str, limit: &FieldValue) -> Result<Simplified>;

    fn on_between(&mut self, field: &str, lower: &FieldValue, upper: &FieldValue)
    -> Result<Simplified>;

    fn on_one_of(&mut self, field: &str, options: &[FieldValue]) -> Result<Simplified>;
}

/// 顶层分发：标签联合上的显式匹配
pub fn simplify_predicate(
    simplifier: &mut dyn PredicateSimplifier,
    predicate: &Predicate,
) -> Result<Simplified> {
    match predicate {
        Predicate::Is(types) => simplifier.on_is(types),
        Predicate::Where(fields) => simplifier.on_where(fields),
    }
}

/// 字段谓词分发
pub fn simplify_field_predicate(
    simplifier: &mut dyn PredicateSimplifier,
    field: &str,
    predicate: &FieldPredicate,
) -> Result<Simplified> {
    match predicate {
        FieldPredicate::Eq(expect) => simplifier.on_eq(field, expect),
        FieldPredicate::NotEq(expect) => simplifier.on_not_eq(field, expect),
        FieldPredicate::Less(limit) => simplifier.on_less(field, limit),
        FieldPredicate::More(limit) => simplifier.on_more(field, limit),
        FieldPredicate::LessEq(limit) => simplifier.on_less_eq(field, limit),
        FieldPredicate::MoreEq(limit) => simplifier.on_more_eq(field, limit),
        FieldPredicate::Between { lower, upper } => simplifier.on_between(field, lower, upper),
        FieldPredicate::OneOf(options) => simplifier.on_one_of(field, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    /// 只会下推 `Is` 的适配器，其余全部保留为残余
    struct TypeOnlySimplifier;

    impl PredicateSimplifier for TypeOnlySimplifier {
        fn on_is(&mut self, types: &[String]) -> Result<Simplified> {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            Ok(Simplified::native(
                format!("type IN ({placeholders})"),
                types.to_vec(),
            ))
        }

        fn on_where(&mut self, fields: &BTreeMap<String, FieldPredicate>) -> Result<Simplified> {
            Ok(Simplified::residual(Predicate::Where(fields.clone())))
        }

        fn on_eq(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!("field predicates only reachable through on_where")
        }

        fn on_not_eq(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!()
        }

        fn on_less(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!()
        }

        fn on_more(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!()
        }

        fn on_less_eq(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!()
        }

        fn on_more_eq(&mut self, _: &str, _: &FieldValue) -> Result<Simplified> {
            unreachable!()
        }

        fn on_between(
            &mut self,
            _: &str,
            _: &FieldValue,
            _: &FieldValue,
        ) -> Result<Simplified> {
            unreachable!()
        }

        fn on_one_of(&mut self, _: &str, _: &[FieldValue]) -> Result<Simplified> {
            unreachable!()
        }
    }

    fn records() -> Vec<(&'static str, Value)> {
        vec![
            ("Deposited", json!({ "amount": 5 })),
            ("Deposited", json!({ "amount": 15 })),
            ("Withdrawn", json!({ "amount": 15 })),
            ("Deposited", json!({ "amount": 25 })),
        ]
    }

    #[test]
    fn fully_lowered_predicate_has_no_residual() {
        let pred = Predicate::is(["Deposited"]);
        let simplified = simplify_predicate(&mut TypeOnlySimplifier, &pred).unwrap();
        assert!(simplified.is_fully_lowered());
        assert_eq!(simplified.clause.as_deref(), Some("type IN (?)"));
        assert_eq!(simplified.params, vec!["Deposited".to_string()]);
    }

    #[test]
    fn residual_evaluation_matches_direct_evaluation() {
        // 适配器拒绝下推 Where：残余部分在进程内求值后，
        // 结果必须与对全集直接求值一致
        let pred = Predicate::where_fields([(
            "amount",
            FieldPredicate::between(10, 20),
        )]);
        let simplified = simplify_predicate(&mut TypeOnlySimplifier, &pred).unwrap();
        assert!(simplified.clause.is_none());

        let residual = simplified.residual.expect("where must remain residual");
        let via_residual: Vec<_> = records()
            .into_iter()
            .filter(|(name, payload)| residual.matches(name, payload))
            .collect();
        let direct: Vec<_> = records()
            .into_iter()
            .filter(|(name, payload)| pred.matches(name, payload))
            .collect();
        assert_eq!(via_residual, direct);
        assert_eq!(via_residual.len(), 2);
    }
}
