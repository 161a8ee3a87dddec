//! ABOUTME: Sandboxed template and predicate language for step inputs and conditions
//! ABOUTME: Lexer -> Pratt parser -> small AST -> pure tree-walking evaluator
//!
//! The same grammar serves three contexts: `{{ expr }}` interpolation inside
//! step input strings, bare predicate strings for step conditions, and
//! polled wait conditions. There is no attribute access to runtime
//! internals, no arbitrary callables, and no side effects: the evaluator is
//! a pure function of the expression and its context.

mod ast;
mod context;
mod eval;
mod lexer;
mod parser;
mod template;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use context::{build_context, normalize_identifier};
pub use eval::{evaluate_ast, truthy};
pub use template::{render_template, resolve_inputs};

use agentloom_core::error::{ExpressionErrorKind, LoomError, Result};
use serde_json::{Map, Value};

/// Functions callable from expressions. Anything else is rejected.
pub const FUNCTION_ALLOWLIST: &[&str] =
    &["range", "len", "str", "int", "float", "bool", "list", "dict"];

/// Filters usable after a pipe. Anything else is rejected.
pub const FILTER_ALLOWLIST: &[&str] = &["tojson", "fromjson"];

pub(crate) fn expr_error(kind: ExpressionErrorKind, message: impl Into<String>) -> LoomError {
    LoomError::Expression {
        message: message.into(),
        kind,
    }
}

/// Parse and evaluate a single expression against a context.
pub fn evaluate(source: &str, context: &Map<String, Value>) -> Result<Value> {
    let expr = parser::parse(source)?;
    eval::evaluate_ast(&expr, context)
}

/// Evaluate a predicate string. A plain string (no delimiters) is parsed as
/// one boolean expression; a templated string is rendered first and its
/// result tested for truthiness.
pub fn evaluate_predicate(source: &str, context: &Map<String, Value>) -> Result<bool> {
    if template::has_delimiters(source) {
        let value = template::render_template(source, context)?;
        Ok(truthy(&value))
    } else {
        let value = evaluate(source, context)?;
        Ok(truthy(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("count".into(), json!(3));
        map.insert("name".into(), json!("loom"));
        map.insert("flags".into(), json!({"ready": true}));
        map
    }

    #[test]
    fn test_evaluate_predicate_plain() {
        assert!(evaluate_predicate("count > 2", &ctx()).unwrap());
        assert!(!evaluate_predicate("count > 5", &ctx()).unwrap());
        assert!(evaluate_predicate("flags.ready and name == 'loom'", &ctx()).unwrap());
    }

    #[test]
    fn test_evaluate_predicate_templated() {
        assert!(evaluate_predicate("{{ flags.ready }}", &ctx()).unwrap());
        assert!(!evaluate_predicate("{{ count - 3 }}", &ctx()).unwrap());
    }

    #[test]
    fn test_unknown_name_kind() {
        let err = evaluate("missing + 1", &ctx()).unwrap_err();
        match err {
            LoomError::Expression { kind, .. } => {
                assert_eq!(kind, ExpressionErrorKind::UnknownName);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_determinism() {
        let context = ctx();
        let first = evaluate("count * 7 + len(name)", &context).unwrap();
        for _ in 0..10 {
            assert_eq!(evaluate("count * 7 + len(name)", &context).unwrap(), first);
        }
    }
}
