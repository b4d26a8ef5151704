//! Command execution.

use crate::Commands;
use colored::Colorize;
use ignite_client::{Cache, Client};
use ignite_protocol::{TypeHint, TypeHints, Value};
use serde_json::{json, Map, Number};

/// Executes a command and returns the formatted output.
pub async fn execute(
    client: &Client,
    cmd: Commands,
    hints: &TypeHints,
) -> Result<String, Box<dyn std::error::Error>> {
    let cache = |name: &str| -> Cache { client.cache(name).with_hints(hints.clone()) };

    match cmd {
        Commands::Put { cache: name, key, value } => {
            let key = parse_arg(&key, hints.key.as_ref())?;
            let value = parse_arg(&value, hints.value.as_ref())?;
            cache(&name).put(key, value).await?;
            Ok("OK".green().to_string())
        }

        Commands::Get { cache: name, key } => {
            let key = parse_arg(&key, hints.key.as_ref())?;
            match cache(&name).get(key).await? {
                Some(value) => Ok(format_json(&to_json(&value))),
                None => Ok("(not found)".yellow().to_string()),
            }
        }

        Commands::Remove { cache: name, key } => {
            let key = parse_arg(&key, hints.key.as_ref())?;
            if cache(&name).remove_key(key).await? {
                Ok("Removed".green().to_string())
            } else {
                Ok("(not found)".yellow().to_string())
            }
        }

        Commands::Contains { cache: name, key } => {
            let key = parse_arg(&key, hints.key.as_ref())?;
            Ok(cache(&name).contains_key(key).await?.to_string())
        }

        Commands::Clear { cache: name } => {
            cache(&name).clear().await?;
            Ok(format!("{} cache {}", "Cleared".green(), name.cyan()))
        }

        Commands::Size { cache: name } => Ok(cache(&name).size().await?.to_string()),

        Commands::Names => {
            let names = client.cache_get_names().await?;
            if names.is_empty() {
                return Ok("No caches".yellow().to_string());
            }
            Ok(names.join("\n"))
        }

        Commands::Create { name } => {
            if client.cache_create_with_name(&name).await? {
                Ok(format!("{} cache {}", "Created".green(), name.cyan()))
            } else {
                Ok(format!("{} cache {}", "Already exists".yellow(), name.cyan()))
            }
        }

        Commands::Destroy { name } => {
            client.cache_destroy(&name).await?;
            Ok(format!("{} cache {}", "Destroyed".green(), name.cyan()))
        }

        Commands::Scan {
            cache: name,
            page_size,
            limit,
        } => {
            let mut cursor = cache(&name).scan(page_size).await?;
            let mut lines = Vec::new();
            while limit.map_or(true, |limit| lines.len() < limit) {
                match cursor.next().await? {
                    Some(entry) => lines.push(entry_json(&entry).to_string()),
                    None => break,
                }
            }
            cursor.close().await;

            if lines.is_empty() {
                return Ok("(empty)".yellow().to_string());
            }
            Ok(lines.join("\n"))
        }

        Commands::GetAll { cache: name, keys } => {
            let keys = keys
                .iter()
                .map(|k| parse_arg(k, hints.key.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;
            let entries = cache(&name).get_all(&keys).await?;
            let rendered: Vec<_> = entries.iter().map(entry_json).collect();
            Ok(format_json(&serde_json::Value::Array(rendered)))
        }

        Commands::PutAll { cache: name, pairs } => {
            let entries = pairs
                .iter()
                .map(|pair| parse_pair(pair, hints))
                .collect::<Result<Vec<_>, _>>()?;
            cache(&name).put_all(&entries).await?;
            Ok(format!("{} {} entries", "Stored".green(), entries.len()))
        }
    }
}

/// Argument that cannot be turned into a value.
#[derive(Debug, thiserror::Error)]
#[error("invalid argument '{arg}': {reason}")]
pub struct ArgumentError {
    arg: String,
    reason: String,
}

impl ArgumentError {
    fn new(arg: &str, reason: impl Into<String>) -> Self {
        Self {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses a command-line argument into a value.
///
/// With a hint the text must fit that type; the cache layer then narrows the
/// width. Without one the text is read as JSON, falling back to a plain string.
pub fn parse_arg(arg: &str, hint: Option<&TypeHint>) -> Result<Value, ArgumentError> {
    let Some(hint) = hint else {
        return Ok(serde_json::from_str(arg)
            .map(|json| from_json(&json))
            .unwrap_or_else(|_| Value::String(arg.to_string())));
    };

    match hint {
        TypeHint::Byte | TypeHint::Short | TypeHint::Int | TypeHint::Long => arg
            .trim()
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|_| ArgumentError::new(arg, format!("expected {}", hint))),
        TypeHint::Float | TypeHint::Double => arg
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| ArgumentError::new(arg, format!("expected {}", hint))),
        TypeHint::Bool => arg
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| ArgumentError::new(arg, "expected true or false")),
        TypeHint::Char | TypeHint::String => Ok(Value::String(arg.to_string())),
        TypeHint::Complex(_) => match serde_json::from_str(arg) {
            Ok(json @ serde_json::Value::Object(_)) => Ok(from_json(&json)),
            _ => Err(ArgumentError::new(arg, "expected a JSON object")),
        },
    }
}

fn parse_pair(pair: &str, hints: &TypeHints) -> Result<(Value, Value), ArgumentError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| ArgumentError::new(pair, "expected KEY=VALUE"))?;
    Ok((
        parse_arg(key, hints.key.as_ref())?,
        parse_arg(value, hints.value.as_ref())?,
    ))
}

/// Maps JSON onto the narrowest natural value: integers become `Int` when
/// they fit, objects become linked maps with string keys.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => i32::try_from(v).map(Value::Int).unwrap_or(Value::Long(v)),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => {
            Value::map(fields.iter().map(|(k, v)| (k.as_str(), from_json(v))))
        }
    }
}

fn float(v: f64) -> serde_json::Value {
    Number::from_f64(v).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Renders a value as JSON for display.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Byte(v) => json!(v),
        Value::Short(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Long(v) => json!(v),
        Value::Float(v) => float(f64::from(*v)),
        Value::Double(v) => float(*v),
        Value::Char(c) => json!(c.to_string()),
        Value::Bool(b) => json!(b),
        Value::String(s) => json!(s),
        Value::Uuid(u) => json!(u.to_string()),
        Value::Date(d) | Value::Timestamp(d) => json!(d.to_rfc3339()),
        Value::Bytes(b) => json!(b.to_vec()),
        Value::ShortArray(v) => json!(v),
        Value::IntArray(v) => json!(v),
        Value::LongArray(v) => json!(v),
        Value::FloatArray(v) => v.iter().map(|f| float(f64::from(*f))).collect(),
        Value::DoubleArray(v) => v.iter().map(|f| float(*f)).collect(),
        Value::CharArray(v) => v.iter().map(|c| json!(c.to_string())).collect(),
        Value::BoolArray(v) => json!(v),
        Value::StringArray(v) => json!(v),
        Value::UuidArray(v) => v
            .iter()
            .map(|u| u.map_or(serde_json::Value::Null, |u| json!(u.to_string())))
            .collect(),
        Value::DateArray(v) => v
            .iter()
            .map(|d| d.map_or(serde_json::Value::Null, |d| json!(d.to_rfc3339())))
            .collect(),
        Value::List(items) | Value::Collection { items, .. } => items.iter().map(to_json).collect(),
        Value::Map { entries, .. } => {
            if entries.iter().all(|(k, _)| k.as_str().is_some()) {
                let fields: Map<String, serde_json::Value> = entries
                    .iter()
                    .map(|(k, v)| (k.as_str().unwrap_or_default().to_string(), to_json(v)))
                    .collect();
                serde_json::Value::Object(fields)
            } else {
                entries.iter().map(|(k, v)| json!([to_json(k), to_json(v)])).collect()
            }
        }
        Value::Enum { type_id, ordinal } => json!({ "type_id": type_id, "ordinal": ordinal }),
        Value::Object(obj) => {
            let mut fields = Map::new();
            fields.insert("@type".to_string(), json!(obj.type_name));
            for (name, v) in &obj.fields {
                fields.insert(name.clone(), to_json(v));
            }
            serde_json::Value::Object(fields)
        }
    }
}

fn entry_json((key, value): &(Value, Value)) -> serde_json::Value {
    json!({ "key": to_json(key), "value": to_json(value) })
}

/// Formats JSON with pretty printing.
fn format_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
