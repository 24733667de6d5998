//! Parsing of the agent's decision payload
//!
//! The model is asked for a bare JSON object:
//!
//! ```json
//! {"thought": "...", "status": "true", "tool_names": "create_transaction",
//!  "args_list": {"create_transaction": {"data": {"amount": 30, ...}}}}
//! ```
//!
//! Surrounding whitespace and a single enclosing ```` ```json ```` fence are
//! tolerated; anything else around the object is rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// The agent's decision, normalized
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    /// The model declined to pick a tool (`status` false or absent)
    Decline { thought: String },
    /// The model picked a tool with arguments (not yet validated)
    Select {
        thought: String,
        tool: String,
        arguments: Value,
    },
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    thought: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    tool_names: Option<Value>,
    #[serde(default)]
    args_list: Option<Value>,
}

/// Strip whitespace and one enclosing code fence
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.trim_end().strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening line
    let body = match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with('{') => &body[newline + 1..],
        _ => body,
    };
    body.trim()
}

fn truncate(text: &str) -> String {
    if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    }
}

fn invalid(reason: impl std::fmt::Display, raw: &str) -> Error {
    Error::InvalidData(format!(
        "Invalid decision from model: {} | Raw: {}",
        reason,
        truncate(raw)
    ))
}

fn parse_status(status: Option<&Value>, raw: &str) -> Result<bool> {
    match status {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(invalid(format!("unrecognized status {:?}", other), raw)),
        },
        Some(other) => Err(invalid(format!("unrecognized status {}", other), raw)),
    }
}

fn parse_tool_name(tool_names: Option<&Value>, raw: &str) -> Result<String> {
    let name = match tool_names {
        Some(Value::String(s)) => Some(s.trim()),
        // A one-element list is read as the single tool it names
        Some(Value::Array(items)) if items.len() == 1 => items[0].as_str().map(str::trim),
        _ => None,
    };
    match name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(invalid("status is true but tool_names is missing", raw)),
    }
}

/// Parse a model response into a decision
///
/// Returns `Error::InvalidData` when the text is not a JSON object of the
/// expected shape.
pub fn parse_decision(response: &str) -> Result<AgentDecision> {
    let body = strip_code_fence(response);
    let raw: RawDecision = serde_json::from_str(body).map_err(|e| invalid(e, response))?;

    let thought = match raw.thought {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if !parse_status(raw.status.as_ref(), response)? {
        return Ok(AgentDecision::Decline { thought });
    }

    let tool = parse_tool_name(raw.tool_names.as_ref(), response)?;
    let arguments = match raw.args_list {
        Some(Value::Object(mut by_tool)) => by_tool.remove(&tool).unwrap_or(Value::Null),
        Some(Value::Null) | None => Value::Null,
        Some(_) => return Err(invalid("args_list is not an object", response)),
    };

    Ok(AgentDecision::Select {
        thought,
        tool,
        arguments,
    })
}
