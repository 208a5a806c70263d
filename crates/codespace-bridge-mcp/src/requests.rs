//! Typed tool arguments, validated before anything touches the target.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ToolError;

/// Longest wait a caller may ask for before a read.
pub const MAX_DELAY_SECS: u64 = 60;

/// Deserialize tool arguments. Missing arguments count as `{}`.
///
/// # Errors
/// Returns `MalformedRequest` describing the first problem found.
pub fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { Value::Object(serde_json::Map::new()) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::MalformedRequest(e.to_string()))
}

fn check_delay(delay: Option<u64>) -> Result<Option<u64>, ToolError> {
    match delay {
        Some(d) if d > MAX_DELAY_SECS => Err(ToolError::MalformedRequest(format!(
            "delay must be between 0 and {MAX_DELAY_SECS} seconds, got {d}"
        ))),
        other => Ok(other),
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub path: String,
    pub view_range: Option<(i64, i64)>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub path: String,
    pub old_str: String,
    pub new_str: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub path: String,
    pub file_text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BashMode {
    #[default]
    Sync,
    Async,
}

#[derive(Debug, Deserialize)]
pub struct BashRequest {
    pub command: String,
    pub description: Option<String>,
    #[serde(default)]
    pub mode: BashMode,
    #[serde(rename = "shellId")]
    pub shell_id: Option<String>,
    /// Seconds.
    pub timeout: Option<u64>,
}

impl BashRequest {
    /// # Errors
    /// Returns `MalformedRequest` for a zero timeout.
    pub fn validated(self) -> Result<Self, ToolError> {
        if self.timeout == Some(0) {
            return Err(ToolError::MalformedRequest(
                "timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct GrepRequest {
    pub pattern: String,
    pub path: Option<String>,
    pub glob: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GlobRequest {
    pub pattern: String,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WriteBashRequest {
    #[serde(rename = "shellId")]
    pub shell_id: String,
    pub input: Option<String>,
    pub delay: Option<u64>,
}

impl WriteBashRequest {
    /// # Errors
    /// Returns `MalformedRequest` for an out-of-range delay.
    pub fn validated(self) -> Result<Self, ToolError> {
        check_delay(self.delay)?;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadBashRequest {
    #[serde(rename = "shellId")]
    pub shell_id: String,
    pub delay: Option<u64>,
}

impl ReadBashRequest {
    /// # Errors
    /// Returns `MalformedRequest` for an out-of-range delay.
    pub fn validated(self) -> Result<Self, ToolError> {
        check_delay(self.delay)?;
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct StopBashRequest {
    #[serde(rename = "shellId")]
    pub shell_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListBashRequest {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_bash_defaults() {
        let req: BashRequest = parse(json!({"command": "ls", "description": "list"})).unwrap();
        assert_eq!(req.mode, BashMode::Sync);
        assert!(req.shell_id.is_none());

        let req: BashRequest = parse(json!({"command": "top", "mode": "async", "shellId": "mon"})).unwrap();
        assert_eq!(req.mode, BashMode::Async);
        assert_eq!(req.shell_id.as_deref(), Some("mon"));
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(matches!(parse::<EditRequest>(json!({"path": "a"})), Err(ToolError::MalformedRequest(_))));
        assert!(matches!(
            parse::<BashRequest>(json!({"command": "ls", "mode": "later"})),
            Err(ToolError::MalformedRequest(_))
        ));
        assert!(matches!(
            parse::<ViewRequest>(json!({"path": "a", "view_range": [1]})),
            Err(ToolError::MalformedRequest(_))
        ));
        assert!(matches!(parse::<ViewRequest>(json!("a.txt")), Err(ToolError::MalformedRequest(_))));
    }

    #[test]
    fn test_view_range_pair() {
        let req: ViewRequest = parse(json!({"path": "a", "view_range": [3, -1]})).unwrap();
        assert_eq!(req.view_range, Some((3, -1)));
    }

    #[test]
    fn test_delay_bounds() {
        let req: ReadBashRequest = parse(json!({"shellId": "x", "delay": 60})).unwrap();
        assert!(req.validated().is_ok());

        let req: WriteBashRequest = parse(json!({"shellId": "x", "delay": 61})).unwrap();
        assert!(matches!(req.validated(), Err(ToolError::MalformedRequest(_))));

        assert!(parse::<ReadBashRequest>(json!({"shellId": "x", "delay": -1})).is_err());
    }

    #[test]
    fn test_timeout_must_be_positive() {
        let req: BashRequest = parse(json!({"command": "ls", "timeout": 0})).unwrap();
        assert!(matches!(req.validated(), Err(ToolError::MalformedRequest(_))));

        let req: BashRequest = parse(json!({"command": "ls", "timeout": 1})).unwrap();
        assert_eq!(req.validated().unwrap().timeout, Some(1));
    }

    #[test]
    fn test_missing_arguments_are_empty_object() {
        assert!(parse::<ListBashRequest>(Value::Null).is_ok());
        assert!(parse::<StopBashRequest>(Value::Null).is_err());
    }
}
