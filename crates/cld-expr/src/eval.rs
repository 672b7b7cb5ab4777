//! Template evaluation and pipes
//!
//! Two modes: a template that is exactly one expression evaluates to the
//! underlying typed value; anything else renders to a string with each
//! expression stringified in place.

use crate::parser::{Expression, Segment, Template};
use crate::{EvalContext, Error, Result};
use cld_schema::Value;
use indexmap::IndexMap;

/// Evaluate a template against a context
///
/// Single-expression templates return the typed value; mixed templates
/// interpolate to `Value::String`.
pub fn evaluate(template: &str, ctx: &EvalContext) -> Result<Value> {
    let parsed = Template::parse(template)?;

    if let Some(expr) = parsed.as_single_expression() {
        return evaluate_expression(expr, ctx);
    }

    let mut out = String::new();
    for segment in parsed.segments() {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Expr(expr) => {
                let value = evaluate_expression(expr, ctx)?;
                out.push_str(&value.to_display_string());
            }
        }
    }
    Ok(Value::String(out))
}

/// Render a template to a string regardless of shape
pub fn interpolate(template: &str, ctx: &EvalContext) -> Result<String> {
    Ok(evaluate(template, ctx)?.to_display_string())
}

/// Deep-evaluate every `Expr` value inside an input map
pub fn evaluate_input_map(
    inputs: &IndexMap<String, Value>,
    ctx: &EvalContext,
) -> Result<IndexMap<String, Value>> {
    let mut resolved = IndexMap::with_capacity(inputs.len());
    for (key, value) in inputs {
        resolved.insert(key.clone(), evaluate_value(value, ctx)?);
    }
    Ok(resolved)
}

/// Best-effort variant for plan-time resolution: a template whose
/// references cannot be resolved yet stays in its raw `Expr` form instead
/// of failing. Other errors (bad grammar, unknown pipes) still surface.
pub fn evaluate_input_map_lenient(
    inputs: &IndexMap<String, Value>,
    ctx: &EvalContext,
) -> Result<IndexMap<String, Value>> {
    let mut resolved = IndexMap::with_capacity(inputs.len());
    for (key, value) in inputs {
        resolved.insert(key.clone(), evaluate_value_lenient(value, ctx)?);
    }
    Ok(resolved)
}

fn evaluate_value_lenient(value: &Value, ctx: &EvalContext) -> Result<Value> {
    match value {
        Value::Expr(template) => match evaluate(template, ctx) {
            Ok(resolved) => Ok(resolved),
            Err(Error::MissingReference(_)) => Ok(value.clone()),
            Err(other) => Err(other),
        },
        Value::List(items) => items
            .iter()
            .map(|item| evaluate_value_lenient(item, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Map(map) => {
            let mut resolved = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), evaluate_value_lenient(item, ctx)?);
            }
            Ok(Value::Map(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn evaluate_value(value: &Value, ctx: &EvalContext) -> Result<Value> {
    match value {
        Value::Expr(template) => evaluate(template, ctx),
        Value::List(items) => items
            .iter()
            .map(|item| evaluate_value(item, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Map(map) => {
            let mut resolved = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), evaluate_value(item, ctx)?);
            }
            Ok(Value::Map(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn evaluate_expression(expr: &Expression, ctx: &EvalContext) -> Result<Value> {
    let mut value = match ctx.resolve(&expr.path) {
        Some(found) => found.clone(),
        None if expr.has_default() => Value::Null,
        None => return Err(Error::MissingReference(expr.path_display())),
    };

    for pipe in &expr.pipes {
        value = apply_pipe(value, &pipe.name, &pipe.args)?;
    }
    Ok(value)
}

pub(crate) fn apply_pipe(value: Value, name: &str, args: &[String]) -> Result<Value> {
    match name {
        "join" => {
            let separator = args.first().map(String::as_str).unwrap_or(",");
            match value {
                Value::List(items) => Ok(Value::String(
                    items
                        .iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(separator),
                )),
                other => Err(pipe_type_error("join", &other)),
            }
        }
        "first" => match value {
            Value::List(items) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
            other => Err(pipe_type_error("first", &other)),
        },
        "last" => match value {
            Value::List(items) => Ok(items.into_iter().next_back().unwrap_or(Value::Null)),
            other => Err(pipe_type_error("last", &other)),
        },
        "length" => match &value {
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(map) => Ok(Value::Int(map.len() as i64)),
            Value::String(s) | Value::Expr(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(pipe_type_error("length", other)),
        },
        "default" => {
            if value.is_null() {
                Ok(parse_literal(args.first().map(String::as_str).unwrap_or("")))
            } else {
                Ok(value)
            }
        }
        "upper" => Ok(Value::String(value.to_display_string().to_uppercase())),
        "lower" => Ok(Value::String(value.to_display_string().to_lowercase())),
        "trim" => Ok(Value::String(value.to_display_string().trim().to_string())),
        other => Err(Error::UnknownPipe(other.to_string())),
    }
}

/// Interpret a pipe argument as the most specific scalar it parses to
fn parse_literal(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

fn pipe_type_error(pipe: &str, value: &Value) -> Error {
    Error::PipeType {
        pipe: pipe.to_string(),
        value: value.to_display_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cld_schema::ResourceType;

    fn db_context() -> EvalContext {
        let mut ctx = EvalContext::new();
        let mut outputs = IndexMap::new();
        outputs.insert("host".to_string(), Value::from("db.internal"));
        outputs.insert("port".to_string(), Value::Int(5432));
        ctx.insert_output(ResourceType::Database, "main", outputs);
        ctx
    }

    #[test]
    fn test_value_mode_preserves_type() {
        let ctx = db_context();
        let value = evaluate("${{ databases.main.port }}", &ctx).unwrap();
        assert_eq!(value, Value::Int(5432));
    }

    #[test]
    fn test_interpolation_stringifies() {
        let ctx = db_context();
        let value = evaluate(
            "postgres://${{ databases.main.host }}:${{ databases.main.port }}/app",
            &ctx,
        )
        .unwrap();
        assert_eq!(
            value,
            Value::String("postgres://db.internal:5432/app".to_string())
        );
    }

    #[test]
    fn test_missing_reference_errors() {
        let ctx = db_context();
        let err = evaluate("${{ databases.main.user }}", &ctx).unwrap_err();
        assert!(matches!(err, Error::MissingReference(_)));
    }

    #[test]
    fn test_default_pipe_rescues_missing() {
        let ctx = EvalContext::new();
        let value = evaluate("${{ variables.region | default:us-east-1 }}", &ctx).unwrap();
        assert_eq!(value, Value::String("us-east-1".to_string()));

        let value = evaluate("${{ variables.replicas | default:3 }}", &ctx).unwrap();
        assert_eq!(value, Value::Int(3));
    }

    #[test]
    fn test_default_pipe_keeps_present_value() {
        let mut ctx = EvalContext::new();
        ctx.set_variable("region", Value::from("eu-west-1"));
        let value = evaluate("${{ variables.region | default:us-east-1 }}", &ctx).unwrap();
        assert_eq!(value, Value::String("eu-west-1".to_string()));
    }

    #[test]
    fn test_join_first_last_length() {
        let mut ctx = EvalContext::new();
        ctx.set_variable(
            "zones",
            Value::List(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
        );

        assert_eq!(
            evaluate("${{ variables.zones | join:/ }}", &ctx).unwrap(),
            Value::String("a/b/c".to_string())
        );
        assert_eq!(
            evaluate("${{ variables.zones | first }}", &ctx).unwrap(),
            Value::String("a".to_string())
        );
        assert_eq!(
            evaluate("${{ variables.zones | last | upper }}", &ctx).unwrap(),
            Value::String("C".to_string())
        );
        assert_eq!(
            evaluate("${{ variables.zones | length }}", &ctx).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_unknown_pipe() {
        let mut ctx = EvalContext::new();
        ctx.set_variable("region", Value::from("x"));
        let err = evaluate("${{ variables.region | reverse }}", &ctx).unwrap_err();
        assert!(matches!(err, Error::UnknownPipe(name) if name == "reverse"));
    }

    #[test]
    fn test_pipe_type_mismatch() {
        let mut ctx = EvalContext::new();
        ctx.set_variable("region", Value::from("x"));
        let err = evaluate("${{ variables.region | join:, }}", &ctx).unwrap_err();
        assert!(matches!(err, Error::PipeType { .. }));
    }

    #[test]
    fn test_evaluate_input_map_deep() {
        let ctx = db_context();
        let yaml = r#"
environment:
  DB_URL: "postgres://${{ databases.main.host }}:${{ databases.main.port }}"
replicas: 2
"#;
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let inputs = value.as_map().unwrap().clone();

        let resolved = evaluate_input_map(&inputs, &ctx).unwrap();
        assert_eq!(
            resolved
                .get("environment")
                .unwrap()
                .get_path(&["DB_URL"])
                .unwrap()
                .as_str(),
            Some("postgres://db.internal:5432")
        );
        assert_eq!(resolved.get("replicas").unwrap().as_int(), Some(2));
    }
}
