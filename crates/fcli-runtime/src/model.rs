//! Parsed action documents.
//!
//! Everything here is immutable once loaded; templates are parsed up front and
//! evaluated many times against different scopes.

use fcli_expr::{ExpectedType, Template, ValueTemplate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDocument {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub config: ActionConfig,
    pub parameters: Vec<Parameter>,
    pub steps: Vec<Step>,
    /// Output name to record projection; the emitted record is bound as `record`.
    pub outputs: IndexMap<String, ValueTemplate>,
    /// File the document was loaded from, if any
    pub origin: Option<PathBuf>,
}

impl ActionDocument {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Directory that relative sub-action references resolve against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.origin.as_deref().and_then(Path::parent)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionConfig {
    /// Backend used by request steps that do not name a target
    pub default_target: Option<String>,
    /// Treat per-item request failures as an overall failure
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    pub default_value: Option<ValueTemplate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn expected(self) -> ExpectedType {
        match self {
            ParamType::String => ExpectedType::String,
            ParamType::Integer => ExpectedType::Integer,
            ParamType::Number => ExpectedType::Number,
            ParamType::Boolean => ExpectedType::Bool,
            ParamType::Array => ExpectedType::Array,
            ParamType::Object => ExpectedType::Object,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Diagnostics label; also the default binding name of a request
    pub name: Option<String>,
    /// Skip the step unless this evaluates to true
    pub condition: Option<Template>,
    pub continue_on_error: bool,
    pub kind: StepKind,
}

impl Step {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.type_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Request(RequestStep),
    SetVariable {
        name: VariablePath,
        value: ValueTemplate,
    },
    RemoveVariable {
        name: String,
    },
    Conditional {
        condition: Template,
        steps: Vec<Step>,
        otherwise: Vec<Step>,
    },
    ForEach(ForEachStep),
    WriteOutput {
        output: String,
        record: ValueTemplate,
        result: Option<Template>,
    },
    InvokeSubAction {
        action: Template,
        parameters: IndexMap<String, ValueTemplate>,
    },
    Log {
        level: LogLevel,
        message: Template,
    },
    Check {
        display_name: Option<String>,
        condition: CheckCondition,
    },
    Throw {
        message: Template,
    },
    Exit {
        code: Template,
    },
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Request(_) => "request",
            StepKind::SetVariable { .. } => "set_variable",
            StepKind::RemoveVariable { .. } => "remove_variable",
            StepKind::Conditional { .. } => "conditional",
            StepKind::ForEach(_) => "for_each",
            StepKind::WriteOutput { .. } => "write_output",
            StepKind::InvokeSubAction { .. } => "invoke_sub_action",
            StepKind::Log { .. } => "log",
            StepKind::Check { .. } => "check",
            StepKind::Throw { .. } => "throw",
            StepKind::Exit { .. } => "exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestStep {
    pub target: Option<String>,
    pub method: String,
    pub uri: Template,
    pub query: IndexMap<String, Template>,
    pub body: Option<ValueTemplate>,
    /// Issue one request per item instead of a single request
    pub expansion: Option<Expansion>,
    pub bind: Option<String>,
    pub output: Option<String>,
    /// Follow the backend's paging until the last page; continuations run per page
    pub paged: bool,
    pub page_progress: PageProgress,
    pub on_success: Vec<Step>,
    pub on_fail: Vec<Step>,
    /// Runs after `on_success` over the records of the (page) response
    pub records: Option<RecordsForEach>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub items: ValueTemplate,
    pub item_var: String,
}

/// Progress messages written around every page of a paged request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageProgress {
    pub pre_load: Option<Template>,
    pub post_load: Option<Template>,
    pub post_process: Option<Template>,
}

impl PageProgress {
    pub fn is_empty(&self) -> bool {
        self.pre_load.is_none() && self.post_load.is_none() && self.post_process.is_none()
    }

    pub fn templates(&self) -> impl Iterator<Item = (&'static str, &Template)> {
        [
            ("page_pre_load", &self.pre_load),
            ("page_post_load", &self.post_load),
            ("page_post_process", &self.post_process),
        ]
        .into_iter()
        .filter_map(|(name, t)| t.as_ref().map(|t| (name, t)))
    }
}

/// Per-record processing of an array response.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordsForEach {
    pub record_var: String,
    /// Records failing this condition are skipped
    pub condition: Option<Template>,
    pub break_if: Option<Template>,
    /// Sub-requests whose processed responses are stored on each record, by key
    pub embed: IndexMap<String, EmbedRequest>,
    pub steps: Vec<Step>,
}

impl RecordsForEach {
    /// Running record count over all pages, `total<RecordVar>Count`.
    pub fn total_count_var(&self) -> String {
        let mut chars = self.record_var.chars();
        match chars.next() {
            Some(first) => format!("total{}{}Count", first.to_uppercase(), chars.as_str()),
            None => "totalCount".to_string(),
        }
    }
}

/// Request issued once per record; only target, method, uri, query and body are used.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedRequest {
    pub condition: Option<Template>,
    pub request: RequestStep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachStep {
    pub items: ValueTemplate,
    pub item_var: String,
    /// Variable copied back to the enclosing scope after every iteration
    pub accumulate: Option<String>,
    pub break_if: Option<Template>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Progress,
    #[default]
    Info,
    Warn,
    Debug,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckCondition {
    PassIf(Template),
    FailIf(Template),
}

/// Assignment target of a `set_variable` step: `name`, `name.prop.sub` or `name..`
/// (append to an array).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePath {
    pub root: String,
    pub segments: Vec<String>,
    pub append: bool,
}

impl VariablePath {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (path, append) = match text.strip_suffix("..") {
            Some(path) => (path, true),
            None => (text, false),
        };
        let mut parts = path.split('.').map(str::trim);
        let root = parts.next().unwrap_or_default().to_string();
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if !is_identifier(&root) {
            return Err(format!("invalid variable name '{}'", text));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("invalid variable path '{}'", text));
        }
        Ok(Self {
            root,
            segments,
            append,
        })
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            segments: Vec::new(),
            append: false,
        }
    }

    pub fn property(root: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            segments: vec![name.into()],
            append: false,
        }
    }
}

impl std::fmt::Display for VariablePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.root)?;
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        if self.append {
            f.write_str("..")?;
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
