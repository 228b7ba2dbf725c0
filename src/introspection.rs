//! Turns a raw introspection `__schema` JSON value (as returned by
//! [`crate::client::fetch_introspection`]) into an [`apollo_compiler::Schema`]
//! by synthesizing SDL text and handing it to `apollo_compiler`'s own
//! parser/validator — rather than building the AST by hand, which the
//! teacher itself never does outside its own (unpublished, monorepo-internal)
//! introspection subcrate. See `DESIGN.md`.

use apollo_compiler::Schema;
use serde_json::Value;
use std::fmt::Write as _;

use crate::error::SingleWeaverError;

fn type_ref_to_sdl(type_ref: &Value) -> Result<String, SingleWeaverError> {
    let kind = type_ref
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape("type ref missing `kind`"))?;
    match kind {
        "NON_NULL" => {
            let of_type = type_ref.get("ofType").ok_or_else(|| bad_shape("NON_NULL missing ofType"))?;
            Ok(format!("{}!", type_ref_to_sdl(of_type)?))
        }
        "LIST" => {
            let of_type = type_ref.get("ofType").ok_or_else(|| bad_shape("LIST missing ofType"))?;
            Ok(format!("[{}]", type_ref_to_sdl(of_type)?))
        }
        _ => {
            let name = type_ref
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_shape("named type ref missing `name`"))?;
            Ok(name.to_owned())
        }
    }
}

fn bad_shape(message: &str) -> SingleWeaverError {
    SingleWeaverError::SchemaBuild {
        endpoint: "<introspection>".to_owned(),
        message: message.to_owned(),
    }
}

fn write_args(out: &mut String, args: &[Value]) -> Result<(), SingleWeaverError> {
    if args.is_empty() {
        return Ok(());
    }
    let rendered = args
        .iter()
        .map(|arg| {
            let name = arg
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| bad_shape("argument missing `name`"))?;
            let ty = type_ref_to_sdl(arg.get("type").ok_or_else(|| bad_shape("argument missing `type`"))?)?;
            Ok(format!("{name}: {ty}"))
        })
        .collect::<Result<Vec<_>, SingleWeaverError>>()?;
    write!(out, "({})", rendered.join(", ")).expect("write! to String never fails");
    Ok(())
}

fn write_fields(out: &mut String, fields: &[Value]) -> Result<(), SingleWeaverError> {
    for field in fields {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| bad_shape("field missing `name`"))?;
        write!(out, "  {name}").unwrap();
        if let Some(args) = field.get("args").and_then(Value::as_array) {
            write_args(out, args)?;
        }
        let ty = type_ref_to_sdl(field.get("type").ok_or_else(|| bad_shape("field missing `type`"))?)?;
        writeln!(out, ": {ty}").unwrap();
    }
    Ok(())
}

/// Synthesizes SDL for one entry of `__schema.types` and appends it to `out`.
/// Introspection always includes the five built-in scalars and every
/// `__`-prefixed meta-type; both are skipped; `apollo_compiler` supplies them.
fn write_type(out: &mut String, named_type: &Value) -> Result<(), SingleWeaverError> {
    let kind = named_type
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape("type missing `kind`"))?;
    let name = named_type
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| bad_shape("type missing `name`"))?;
    if name.starts_with("__") || matches!(name, "Int" | "Float" | "String" | "Boolean" | "ID") {
        return Ok(());
    }
    match kind {
        "SCALAR" => {
            writeln!(out, "scalar {name}").unwrap();
        }
        "OBJECT" | "INTERFACE" => {
            let interfaces = named_type
                .get("interfaces")
                .and_then(Value::as_array)
                .map(|ifaces| {
                    ifaces
                        .iter()
                        .filter_map(|i| i.get("name").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let keyword = if kind == "OBJECT" { "type" } else { "interface" };
            write!(out, "{keyword} {name}").unwrap();
            if !interfaces.is_empty() {
                write!(out, " implements {}", interfaces.join(" & ")).unwrap();
            }
            writeln!(out, " {{").unwrap();
            if let Some(fields) = named_type.get("fields").and_then(Value::as_array) {
                write_fields(out, fields)?;
            }
            writeln!(out, "}}").unwrap();
        }
        "UNION" => {
            let members = named_type
                .get("possibleTypes")
                .and_then(Value::as_array)
                .map(|types| {
                    types
                        .iter()
                        .filter_map(|t| t.get("name").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            writeln!(out, "union {name} = {}", members.join(" | ")).unwrap();
        }
        "ENUM" => {
            writeln!(out, "enum {name} {{").unwrap();
            if let Some(values) = named_type.get("enumValues").and_then(Value::as_array) {
                for value in values {
                    let value_name = value
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| bad_shape("enum value missing `name`"))?;
                    writeln!(out, "  {value_name}").unwrap();
                }
            }
            writeln!(out, "}}").unwrap();
        }
        "INPUT_OBJECT" => {
            writeln!(out, "input {name} {{").unwrap();
            if let Some(fields) = named_type.get("inputFields").and_then(Value::as_array) {
                for field in fields {
                    let field_name = field
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| bad_shape("input field missing `name`"))?;
                    let ty = type_ref_to_sdl(
                        field.get("type").ok_or_else(|| bad_shape("input field missing `type`"))?,
                    )?;
                    writeln!(out, "  {field_name}: {ty}").unwrap();
                }
            }
            writeln!(out, "}}").unwrap();
        }
        other => return Err(bad_shape(&format!("unsupported introspection kind `{other}`"))),
    }
    Ok(())
}

/// Builds a validated [`Schema`] from a raw `__schema` introspection value.
pub fn schema_from_introspection(endpoint_name: &str, schema_json: &Value) -> Result<Schema, SingleWeaverError> {
    let types = schema_json
        .get("types")
        .and_then(Value::as_array)
        .ok_or_else(|| bad_shape("introspection result missing `types`"))?;

    let mut sdl = String::new();
    let query_name = schema_json
        .get("queryType")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str);
    let mutation_name = schema_json
        .get("mutationType")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str);
    let subscription_name = schema_json
        .get("subscriptionType")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str);

    writeln!(sdl, "schema {{").unwrap();
    if let Some(query_name) = query_name {
        writeln!(sdl, "  query: {query_name}").unwrap();
    }
    if let Some(mutation_name) = mutation_name {
        writeln!(sdl, "  mutation: {mutation_name}").unwrap();
    }
    if let Some(subscription_name) = subscription_name {
        writeln!(sdl, "  subscription: {subscription_name}").unwrap();
    }
    writeln!(sdl, "}}").unwrap();

    for named_type in types {
        write_type(&mut sdl, named_type).map_err(|err| retag_endpoint(err, endpoint_name))?;
    }

    let schema = Schema::parse(&sdl, format!("{endpoint_name}.graphql"))
        .map_err(|err| SingleWeaverError::SchemaBuild {
            endpoint: endpoint_name.to_owned(),
            message: err.to_string(),
        })?
        .validate()
        .map_err(|err| SingleWeaverError::SchemaBuild {
            endpoint: endpoint_name.to_owned(),
            message: err.to_string(),
        })?
        .into_inner();
    Ok(schema)
}

fn retag_endpoint(err: SingleWeaverError, endpoint_name: &str) -> SingleWeaverError {
    match err {
        SingleWeaverError::SchemaBuild { message, .. } => SingleWeaverError::SchemaBuild {
            endpoint: endpoint_name.to_owned(),
            message,
        },
        other => other,
    }
}
