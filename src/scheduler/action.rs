use serde_json::Value;
use std::fmt;

/// Action proposed by the orchestrator after analysis.
///
/// Parsing is total: null, non-objects, missing or unknown `action` tags all
/// become [`Action::Noop`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AutoExecute { payload: Value },
    Ask { prompt: Option<String>, payload: Value },
    Noop,
}

impl Action {
    pub fn from_value(value: &Value) -> Self {
        let Some(tag) = value.get("action").and_then(Value::as_str) else {
            return Action::Noop;
        };

        match tag.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto-execute" => Action::AutoExecute {
                payload: value.clone(),
            },
            "ask" => Action::Ask {
                prompt: value
                    .get("message")
                    .or_else(|| value.get("prompt"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                payload: value.clone(),
            },
            _ => Action::Noop,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::AutoExecute { .. } => "auto-execute",
            Action::Ask { .. } => "ask",
            Action::Noop => "noop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
