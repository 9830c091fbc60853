//! Field templates.
//!
//! Renders `{{ .Field }}` and `{{ .Nested.Field }}` actions against a
//! converted value; `{{ . }}` renders the data itself. Text outside actions
//! is copied as-is. This is the syntax default task prefixes use
//! (`[remote:{{.Host.Name}}] `).
//!
//! | Action resolves to     | Output            |
//! |------------------------|-------------------|
//! | string, number, bool   | its text          |
//! | mapping or sequence    | JSON              |
//! | missing key or nil     | `<no value>`      |

use crate::error::TemplateError;
use crate::value::DynamicValue;

/// Output for a lookup that finds nothing.
pub const NO_VALUE: &str = "<no value>";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub fn render(template: &str, data: &DynamicValue) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let action_src = &rest[start + OPEN.len()..];
        let end = action_src
            .find(CLOSE)
            .ok_or(TemplateError::Unclosed(offset + start))?;
        output.push_str(&evaluate(action_src[..end].trim(), data)?);

        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    output.push_str(rest);
    Ok(output)
}

fn evaluate(action: &str, data: &DynamicValue) -> Result<String, TemplateError> {
    let unsupported = || TemplateError::Unsupported(action.to_string());
    let path = action.strip_prefix('.').ok_or_else(unsupported)?;
    if path.is_empty() {
        return Ok(display(data));
    }

    let mut current = data;
    for segment in path.split('.') {
        if segment.is_empty() || !segment.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(unsupported());
        }
        match current.as_mapping().and_then(|m| m.get(segment)) {
            Some(value) => current = value,
            None => return Ok(NO_VALUE.to_string()),
        }
    }
    Ok(display(current))
}

fn display(value: &DynamicValue) -> String {
    match value {
        DynamicValue::Nil => NO_VALUE.to_string(),
        DynamicValue::Mapping(_) | DynamicValue::Sequence(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
