//! Issue records flowing through the block and anchor stages.
//!
//! An [`Issue`] keeps every field exported by the scanner exactly as loaded
//! (key order included); the typed accessors only read from it. Stages
//! attach their results to an [`IssueRecord`], which always exists for every
//! input issue: failures are recorded as data on the record.
//!
//! Stage results live under [`STAGE_KEYS`], which are namespaced so that
//! scanner metadata such as `status` or `error` never collides with them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::anchor::Anchor;
use crate::core::blocks::Block;

/// Keys written by the pipeline stages. Anything else belongs to the issue.
pub const STAGE_KEYS: [&str; 4] = ["blocks", "anchors", "context_status", "context_error"];

/// One finding from the external scanner, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issue
{
    fields: Map<String, Value>,
}

impl Issue
{
    pub fn new(fields: Map<String, Value>) -> Self
    {
        Self { fields }
    }

    /// Issues must be JSON objects; anything else is reported on the record.
    pub fn from_value(value: Value) -> Result<Self, IssueError>
    {
        match value
        {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(IssueError::MalformedRecord(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Repo-relative source path; `None` when missing or empty.
    pub fn file_path(&self) -> Option<&str>
    {
        self.fields
            .get("file_path")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// 1-based first line of the snippet (defaults to 1).
    pub fn start_line(&self) -> i64
    {
        self.line_field("start_line")
            .unwrap_or(1)
    }

    /// 1-based last line of the snippet (defaults to `start_line`).
    pub fn end_line(&self) -> i64
    {
        self.line_field("end_line")
            .unwrap_or_else(|| self.start_line())
    }

    /// Opaque identifier, empty when the export did not carry one.
    pub fn issue_key(&self) -> &str
    {
        self.fields
            .get("issue_key")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn fields(&self) -> &Map<String, Value>
    {
        &self.fields
    }

    /// Line numbers come as JSON numbers or numeric strings depending on the
    /// exporter.
    fn line_field(
        &self,
        key: &str,
    ) -> Option<i64>
    {
        match self
            .fields
            .get(key)?
        {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .map(|f| f as i64)
                }),
            Value::String(s) => s
                .trim()
                .parse()
                .ok(),
            _ => None,
        }
    }
}

/// Outcome of the anchor stage for one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus
{
    /// An enclosing function was found and call sites were searched.
    Resolved,
    /// Heuristic miss: treat the issue as file-level.
    NoAnchor,
    /// Input could not be processed; see `error`.
    Error,
}

/// Per-issue failures. Rendered into the record's `error` field; never
/// propagated past the issue boundary.
#[derive(Debug, thiserror::Error)]
pub enum IssueError
{
    #[error("Missing file_path in issue metadata.")]
    MissingFilePath,

    #[error("Source file not found: {0}")]
    SourceNotFound(String),

    #[error("Failed to read source file {path}: {reason}")]
    Unreadable
    {
        path: String,
        reason: String,
    },

    #[error("Missing blocks; run the block stage first.")]
    MissingBlocks,

    #[error("No function definition found in search window above issue line.")]
    NoEnclosingFunction,

    #[error("Malformed issue record: {0}")]
    MalformedRecord(String),
}

impl IssueError
{
    /// Heuristic misses are reported separately from hard errors.
    pub fn status(&self) -> IssueStatus
    {
        match self
        {
            IssueError::NoEnclosingFunction => IssueStatus::NoAnchor,
            _ => IssueStatus::Error,
        }
    }
}

/// An issue plus whatever the pipeline stages attached to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRecord
{
    #[serde(flatten)]
    pub issue: Issue,

    /// Innermost block first, whole-file block last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,

    /// At most one anchor; serialized as a list for downstream prompt tooling.
    #[serde(default, rename = "anchors", with = "anchor_list")]
    pub anchor: Option<Anchor>,

    #[serde(default, rename = "context_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,

    #[serde(default, rename = "context_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IssueRecord
{
    /// Fresh record; stale stage keys in the metadata are dropped so they
    /// are not written twice.
    pub fn from_issue(mut issue: Issue) -> Self
    {
        issue
            .fields
            .retain(|key, _| !STAGE_KEYS.contains(&key.as_str()));
        Self { issue, ..Self::default() }
    }

    /// Load one record written by an earlier stage.
    ///
    /// Never fails: a record whose stage fields do not parse keeps its
    /// metadata and carries the parse error instead. `null` stage fields
    /// count as absent, so `"blocks": null` reads as missing blocks.
    pub fn from_value(value: Value) -> Self
    {
        let mut issue = match Issue::from_value(value)
        {
            Ok(issue) => issue,
            Err(err) => return Self::default().fail(err),
        };
        issue
            .fields
            .retain(|key, value| !(value.is_null() && STAGE_KEYS.contains(&key.as_str())));

        let value = Value::Object(issue.fields);
        let err = match Self::deserialize(&value)
        {
            Ok(record) => return record,
            Err(err) => IssueError::MalformedRecord(err.to_string()),
        };
        let fields = match value
        {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        Self::from_issue(Issue::new(fields)).fail(err)
    }

    /// Record a per-issue failure, replacing any earlier message.
    pub fn fail(
        mut self,
        err: IssueError,
    ) -> Self
    {
        self.anchor = None;
        self.status = Some(err.status());
        self.error = Some(err.to_string());
        self
    }

    pub fn is_error(&self) -> bool
    {
        self.status == Some(IssueStatus::Error)
            || (self.status.is_none() && self.error.is_some())
    }
}

fn json_kind(value: &Value) -> &'static str
{
    match value
    {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `Option<Anchor>` <-> `[]` / `[anchor]`.
mod anchor_list
{
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::core::anchor::Anchor;

    pub fn serialize<S>(
        anchor: &Option<Anchor>,
        s: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        anchor
            .as_slice()
            .serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Anchor>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<Anchor>::deserialize(d)?;
        Ok(list
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests
{
    use serde_json::json;

    use super::*;

    fn issue(v: Value) -> Issue
    {
        serde_json::from_value(v).expect("issue json")
    }

    #[test]
    fn accessors_read_numbers_and_strings()
    {
        let i = issue(json!({
            "issue_key": "AX-1",
            "file_path": "a/b.cpp",
            "start_line": "12",
            "end_line": 14,
        }));
        assert_eq!(i.issue_key(), "AX-1");
        assert_eq!(i.file_path(), Some("a/b.cpp"));
        assert_eq!(i.start_line(), 12);
        assert_eq!(i.end_line(), 14);
    }

    #[test]
    fn missing_lines_default_to_one_and_start()
    {
        let i = issue(json!({ "file_path": "" , "start_line": 7 }));
        assert_eq!(i.file_path(), None);
        assert_eq!(i.end_line(), 7);

        let i = issue(json!({}));
        assert_eq!(i.start_line(), 1);
        assert_eq!(i.end_line(), 1);
    }

    #[test]
    fn record_passes_metadata_through_in_order()
    {
        let rec = IssueRecord::from_issue(issue(json!({
            "rule": "cpp:S1234",
            "file_path": "x.cpp",
            "severity": "MAJOR",
        })));
        let out = serde_json::to_string(&rec).unwrap();
        assert_eq!(out, r#"{"rule":"cpp:S1234","file_path":"x.cpp","severity":"MAJOR","anchors":[]}"#);
    }

    #[test]
    fn failure_sets_status_and_message()
    {
        let rec = IssueRecord::default().fail(IssueError::NoEnclosingFunction);
        assert_eq!(rec.status, Some(IssueStatus::NoAnchor));
        assert!(!rec.is_error());

        let rec = IssueRecord::default().fail(IssueError::SourceNotFound("a.cpp".into()));
        assert_eq!(rec.status, Some(IssueStatus::Error));
        assert_eq!(rec.error.as_deref(), Some("Source file not found: a.cpp"));
        assert!(rec.is_error());
    }

    #[test]
    fn record_round_trips_stage_fields_out_of_metadata()
    {
        let v = json!({
            "issue_key": "K",
            "blocks": [{ "level": 0, "indent": 0, "start": 1, "end": 2, "code": "a\nb\n" }],
            "anchors": [],
            "context_status": "no_anchor",
        });
        let rec: IssueRecord = serde_json::from_value(v).unwrap();
        assert_eq!(rec.blocks.len(), 1);
        assert_eq!(rec.blocks[0].end_line, 2);
        assert!(rec.anchor.is_none());
        assert_eq!(rec.status, Some(IssueStatus::NoAnchor));
        assert_eq!(rec.issue.fields().len(), 1);
    }

    #[test]
    fn scanner_status_and_error_stay_metadata()
    {
        let rec = IssueRecord::from_issue(issue(json!({
            "issue_key": "K1",
            "status": "OPEN",
            "error": "file_read_error",
        })))
        .fail(IssueError::SourceNotFound("a.cpp".into()));

        let out = serde_json::to_string(&rec).unwrap();
        assert_eq!(out.matches("\"status\"").count(), 1);
        assert_eq!(out.matches("\"error\"").count(), 1);

        let back = IssueRecord::from_value(serde_json::from_str(&out).unwrap());
        assert_eq!(back.status, Some(IssueStatus::Error));
        assert_eq!(back.error.as_deref(), Some("Source file not found: a.cpp"));
        assert_eq!(back.issue.fields()["status"], "OPEN");
        assert_eq!(back.issue.fields()["error"], "file_read_error");
    }

    #[test]
    fn fresh_record_drops_stale_stage_keys()
    {
        let rec = IssueRecord::from_issue(issue(json!({
            "issue_key": "K",
            "blocks": "stale",
            "context_status": "resolved",
            "rule": "r",
        })));
        let keys: Vec<&str> = rec
            .issue
            .fields()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["issue_key", "rule"]);
        assert_eq!(rec.status, None);
    }

    #[test]
    fn null_stage_fields_read_as_absent()
    {
        let rec = IssueRecord::from_value(json!({
            "issue_key": "K",
            "blocks": null,
            "anchors": null,
            "context_error": null,
        }));
        assert!(rec.blocks.is_empty());
        assert!(rec.error.is_none());
        assert_eq!(rec.issue.fields().len(), 1);
    }

    #[test]
    fn bad_stage_fields_become_a_record_error()
    {
        let rec = IssueRecord::from_value(json!({
            "issue_key": "K",
            "rule": "r",
            "blocks": [{ "level": 0, "start": "one", "end": 2, "code": "" }],
        }));
        assert!(rec.is_error());
        assert!(rec
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Malformed issue record:"));
        assert_eq!(rec.issue.issue_key(), "K");
        assert!(!rec
            .issue
            .fields()
            .contains_key("blocks"));
    }

    #[test]
    fn non_object_record_is_an_error()
    {
        let rec = IssueRecord::from_value(json!([1, 2]));
        assert_eq!(rec.status, Some(IssueStatus::Error));
        assert_eq!(
            rec.error.as_deref(),
            Some("Malformed issue record: expected a JSON object, found an array")
        );
    }
}
