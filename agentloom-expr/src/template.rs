//! ABOUTME: Template renderer: literal text with embedded expressions and control tags
//! ABOUTME: Single-expression templates preserve the value's type; mixed templates stringify

use crate::eval::{evaluate_ast, to_display_string, truthy};
use crate::{expr_error, parser};
use agentloom_core::error::{ExpressionErrorKind, Result};
use serde_json::{Map, Value};

pub(crate) fn has_delimiters(template: &str) -> bool {
    template.contains("{{") || template.contains("{%")
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Interp(String),
    Tag(Tag),
}

#[derive(Debug)]
enum Tag {
    If(String),
    Elif(String),
    Else,
    Endif,
}

fn scan(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = template;

    loop {
        let interp = rest.find("{{");
        let control = rest.find("{%");
        let (start, closer, is_interp) = match (interp, control) {
            (None, None) => {
                if !rest.is_empty() {
                    segments.push(Segment::Literal(rest.to_string()));
                }
                return Ok(segments);
            }
            (Some(a), None) => (a, "}}", true),
            (None, Some(b)) => (b, "%}", false),
            (Some(a), Some(b)) if a < b => (a, "}}", true),
            (_, Some(b)) => (b, "%}", false),
        };

        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let body_start = start + 2;
        let end = rest[body_start..].find(closer).ok_or_else(|| {
            expr_error(
                ExpressionErrorKind::Parse,
                format!("unterminated '{}' block", &rest[start..start + 2]),
            )
        })?;
        let body = rest[body_start..body_start + end].trim().to_string();

        if is_interp {
            segments.push(Segment::Interp(body));
        } else {
            let tag = if let Some(expr) = body.strip_prefix("if ") {
                Tag::If(expr.trim().to_string())
            } else if let Some(expr) = body.strip_prefix("elif ") {
                Tag::Elif(expr.trim().to_string())
            } else if body == "else" {
                Tag::Else
            } else if body == "endif" {
                Tag::Endif
            } else {
                return Err(expr_error(
                    ExpressionErrorKind::Parse,
                    format!("unknown control tag '{body}'"),
                ));
            };
            segments.push(Segment::Tag(tag));
        }
        rest = &rest[body_start + end + 2..];
    }
}

#[derive(Debug)]
enum Node {
    Text(String),
    Interp(String),
    If {
        branches: Vec<(String, Vec<Node>)>,
        else_branch: Option<Vec<Node>>,
    },
}

/// Build a node tree from the flat segment stream. Returns the nodes plus
/// the tag that terminated this block, if any.
fn parse_nodes(
    segments: &[Segment],
    pos: &mut usize,
    inside_if: bool,
) -> Result<(Vec<Node>, Option<&'static str>)> {
    let mut nodes = Vec::new();
    while *pos < segments.len() {
        match &segments[*pos] {
            Segment::Literal(text) => {
                nodes.push(Node::Text(text.clone()));
                *pos += 1;
            }
            Segment::Interp(expr) => {
                nodes.push(Node::Interp(expr.clone()));
                *pos += 1;
            }
            Segment::Tag(Tag::If(cond)) => {
                *pos += 1;
                let mut branches = Vec::new();
                let mut else_branch = None;
                let mut current_cond = cond.clone();
                loop {
                    let (body, terminator) = parse_nodes(segments, pos, true)?;
                    match terminator {
                        Some("elif") => {
                            branches.push((current_cond.clone(), body));
                            // The elif condition was stashed by the recursive call
                            if let Segment::Tag(Tag::Elif(next)) = &segments[*pos] {
                                current_cond = next.clone();
                            }
                            *pos += 1;
                        }
                        Some("else") => {
                            branches.push((current_cond.clone(), body));
                            *pos += 1;
                            let (else_body, terminator) = parse_nodes(segments, pos, true)?;
                            if terminator != Some("endif") {
                                return Err(expr_error(
                                    ExpressionErrorKind::Parse,
                                    "expected {% endif %} after {% else %}",
                                ));
                            }
                            *pos += 1;
                            else_branch = Some(else_body);
                            break;
                        }
                        Some("endif") => {
                            branches.push((current_cond.clone(), body));
                            *pos += 1;
                            break;
                        }
                        _ => {
                            return Err(expr_error(
                                ExpressionErrorKind::Parse,
                                "unterminated {% if %} block",
                            ));
                        }
                    }
                }
                nodes.push(Node::If {
                    branches,
                    else_branch,
                });
            }
            Segment::Tag(Tag::Elif(_)) => {
                if !inside_if {
                    return Err(expr_error(
                        ExpressionErrorKind::Parse,
                        "{% elif %} outside {% if %}",
                    ));
                }
                return Ok((nodes, Some("elif")));
            }
            Segment::Tag(Tag::Else) => {
                if !inside_if {
                    return Err(expr_error(
                        ExpressionErrorKind::Parse,
                        "{% else %} outside {% if %}",
                    ));
                }
                return Ok((nodes, Some("else")));
            }
            Segment::Tag(Tag::Endif) => {
                if !inside_if {
                    return Err(expr_error(
                        ExpressionErrorKind::Parse,
                        "{% endif %} outside {% if %}",
                    ));
                }
                return Ok((nodes, Some("endif")));
            }
        }
    }
    Ok((nodes, None))
}

fn render_nodes(nodes: &[Node], context: &Map<String, Value>, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Interp(source) => {
                let expr = parser::parse(source)?;
                let value = evaluate_ast(&expr, context)?;
                out.push_str(&to_display_string(&value));
            }
            Node::If {
                branches,
                else_branch,
            } => {
                let mut taken = false;
                for (cond, body) in branches {
                    let expr = parser::parse(cond)?;
                    if truthy(&evaluate_ast(&expr, context)?) {
                        render_nodes(body, context, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(body) = else_branch {
                        render_nodes(body, context, out)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Render a template string against a context.
///
/// A template that is exactly one `{{ expr }}` resolves to the expression's
/// value with its type preserved; anything mixed renders to a string. A
/// string without delimiters passes through unchanged.
pub fn render_template(template: &str, context: &Map<String, Value>) -> Result<Value> {
    if !has_delimiters(template) {
        return Ok(Value::String(template.to_string()));
    }

    let segments = scan(template)?;
    let non_empty: Vec<&Segment> = segments
        .iter()
        .filter(|s| !matches!(s, Segment::Literal(text) if text.is_empty()))
        .collect();
    if let [Segment::Interp(source)] = non_empty.as_slice() {
        let expr = parser::parse(source)?;
        return evaluate_ast(&expr, context);
    }

    let mut pos = 0;
    let (nodes, terminator) = parse_nodes(&segments, &mut pos, false)?;
    debug_assert!(terminator.is_none());
    let mut out = String::new();
    render_nodes(&nodes, context, &mut out)?;
    Ok(Value::String(out))
}

/// Resolve every string value in a step input map through the template
/// renderer, recursing into arrays and nested objects.
pub fn resolve_inputs(
    inputs: &Map<String, Value>,
    context: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut resolved = Map::new();
    for (key, value) in inputs {
        resolved.insert(key.clone(), resolve_value(value, context)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, context: &Map<String, Value>) -> Result<Value> {
    match value {
        Value::String(template) => render_template(template, context),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, context)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), resolve_value(item, context)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Map<String, Value> {
        serde_json::from_value(json!({
            "n": 3,
            "name": "loom",
            "ready": true,
            "steps": {"fetch": {"count": 7}},
        }))
        .unwrap()
    }

    #[test]
    fn test_single_expression_preserves_type() {
        assert_eq!(render_template("{{ n }}", &ctx()).unwrap(), json!(3));
        assert_eq!(
            render_template("{{ steps['fetch'] }}", &ctx()).unwrap(),
            json!({"count": 7})
        );
        assert_eq!(render_template("{{ n > 1 }}", &ctx()).unwrap(), json!(true));
    }

    #[test]
    fn test_mixed_template_yields_string() {
        assert_eq!(
            render_template("n is {{ n }}!", &ctx()).unwrap(),
            json!("n is 3!")
        );
        assert_eq!(
            render_template("{{ n }}{{ n }}", &ctx()).unwrap(),
            json!("33")
        );
    }

    #[test]
    fn test_plain_string_passes_through() {
        assert_eq!(
            render_template("no templates here", &ctx()).unwrap(),
            json!("no templates here")
        );
    }

    #[test]
    fn test_if_blocks() {
        let template = "{% if ready %}go{% else %}hold{% endif %}";
        assert_eq!(render_template(template, &ctx()).unwrap(), json!("go"));

        let template = "{% if n > 5 %}big{% elif n > 2 %}mid{% else %}small{% endif %}";
        assert_eq!(render_template(template, &ctx()).unwrap(), json!("mid"));
    }

    #[test]
    fn test_nested_if_blocks() {
        let template =
            "{% if ready %}{% if n == 3 %}three{% else %}other{% endif %}{% endif %}";
        assert_eq!(render_template(template, &ctx()).unwrap(), json!("three"));
    }

    #[test]
    fn test_unterminated_blocks_rejected() {
        assert!(render_template("{{ n ", &ctx()).is_err());
        assert!(render_template("{% if ready %}go", &ctx()).is_err());
        assert!(render_template("{% endif %}", &ctx()).is_err());
    }

    #[test]
    fn test_resolve_inputs_recurses() {
        let inputs: Map<String, Value> = serde_json::from_value(json!({
            "count": "{{ n }}",
            "label": "run-{{ name }}",
            "fixed": 10,
            "nested": {"inner": "{{ steps['fetch'].count }}"},
            "listed": ["{{ n }}", "literal"],
        }))
        .unwrap();
        let resolved = resolve_inputs(&inputs, &ctx()).unwrap();
        assert_eq!(resolved["count"], json!(3));
        assert_eq!(resolved["label"], json!("run-loom"));
        assert_eq!(resolved["fixed"], json!(10));
        assert_eq!(resolved["nested"], json!({"inner": 7}));
        assert_eq!(resolved["listed"], json!([3, "literal"]));
    }

    #[test]
    fn test_resolution_failure_surfaces() {
        let inputs: Map<String, Value> =
            serde_json::from_value(json!({"x": "{{ missing }}"})).unwrap();
        assert!(resolve_inputs(&inputs, &ctx()).is_err());
    }
}
