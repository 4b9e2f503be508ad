//! Tool requirement records carried through a session.

use serde::{Deserialize, Serialize};

/// Name tokens that mark a tool as backed by a third-party API.
const API_TOKENS: &[&str] = &["api", "http", "https", "rest", "restful", "web", "fetch"];

/// Name token prefixes that mark a visualization tool.
const VISUALIZATION_PREFIXES: &[&str] = &["visual", "plot", "chart", "graph"];

/// What sort of tool a requirement describes.
///
/// Decided once when the requirement is created and carried with it; the
/// synthesizer picks its generation path from this tag and the resolver
/// prioritizes by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Wraps a third-party API; generated from scraped documentation.
    Api,
    /// Produces charts or plots.
    Visualization,
    #[default]
    General,
}

impl ToolKind {
    /// Classify a tool by the tokens of its name.
    ///
    /// Names are split on non-alphanumerics and camel-case boundaries, so
    /// `Weather_API_Tool` and `WeatherAPITool` are API tools while
    /// `Compound_Interest_Calculator` is not.
    pub fn classify(name: &str) -> Self {
        let tokens = name_tokens(name);
        if tokens.iter().any(|t| API_TOKENS.contains(&t.as_str())) {
            ToolKind::Api
        } else if tokens
            .iter()
            .any(|t| VISUALIZATION_PREFIXES.iter().any(|p| t.starts_with(p)))
        {
            ToolKind::Visualization
        } else {
            ToolKind::General
        }
    }

    /// Lower sorts first when the tool list has to be cut.
    pub fn priority(&self) -> u8 {
        match self {
            ToolKind::Api => 0,
            ToolKind::Visualization => 1,
            ToolKind::General => 2,
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(ToolKind::Api),
            "visualization" | "visualisation" | "viz" => Ok(ToolKind::Visualization),
            "general" | "other" => Ok(ToolKind::General),
            other => Err(format!("unknown tool kind '{other}'")),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Api => write!(f, "api"),
            ToolKind::Visualization => write!(f, "visualization"),
            ToolKind::General => write!(f, "general"),
        }
    }
}

/// Lowercased name tokens, split on separators and camel-case humps.
pub(crate) fn name_tokens(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower) {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// One tool the current task needs.
///
/// `is_available` is only ever true while `function` holds code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub kind: ToolKind,
    #[serde(default)]
    pub is_available: bool,
    #[serde(default)]
    pub function: String,
}

impl ToolRequirement {
    /// A fresh, unavailable requirement classified by its name.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ToolKind::classify(&name),
            name,
            description: description.into(),
            is_available: false,
            function: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach code and mark the tool available. Blank code is ignored.
    pub fn make_available(&mut self, function: impl Into<String>) -> bool {
        let function = function.into();
        if function.trim().is_empty() {
            return false;
        }
        self.function = function;
        self.is_available = true;
        true
    }

    /// Mark unavailable again, keeping the code as context for regeneration.
    pub fn revoke(&mut self) {
        self.is_available = false;
    }

    /// Whether the tool may be run.
    pub fn is_executable(&self) -> bool {
        self.is_available && !self.function.trim().is_empty()
    }
}
