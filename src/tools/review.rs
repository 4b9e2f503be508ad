//! Advisory annotations for code staged for human review.
//!
//! Nothing here blocks a tool. The notes are printed next to the code so
//! the reviewer knows where to look.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::sandbox::needs_credential;

/// How much attention a finding deserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One risky construct found in the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub pattern: String,
    pub severity: Severity,
    /// 1-based line number.
    pub line: usize,
    pub description: String,
}

/// Notes attached to a tool under review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNotes {
    /// The code carries the credential placeholder and will prompt for a key.
    pub requires_credential: bool,
    pub findings: Vec<Finding>,
}

impl ReviewNotes {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

struct PatternInfo {
    pattern: &'static str,
    severity: Severity,
    description: &'static str,
}

const PATTERNS: &[PatternInfo] = &[
    PatternInfo {
        pattern: "subprocess",
        severity: Severity::High,
        description: "Spawns other processes",
    },
    PatternInfo {
        pattern: "os.system",
        severity: Severity::High,
        description: "Runs a shell command",
    },
    PatternInfo {
        pattern: "os.popen",
        severity: Severity::High,
        description: "Runs a shell command",
    },
    PatternInfo {
        pattern: "eval(",
        severity: Severity::High,
        description: "Evaluates dynamic code",
    },
    PatternInfo {
        pattern: "exec(",
        severity: Severity::High,
        description: "Executes dynamic code",
    },
    PatternInfo {
        pattern: "shutil.rmtree",
        severity: Severity::High,
        description: "Deletes a directory tree",
    },
    PatternInfo {
        pattern: "os.remove",
        severity: Severity::Medium,
        description: "Deletes files",
    },
    PatternInfo {
        pattern: "rm -rf",
        severity: Severity::High,
        description: "Recursive deletion",
    },
    PatternInfo {
        pattern: "pip install",
        severity: Severity::Medium,
        description: "Installs packages at runtime",
    },
    PatternInfo {
        pattern: "__import__",
        severity: Severity::Medium,
        description: "Dynamic import",
    },
    PatternInfo {
        pattern: "pickle.load",
        severity: Severity::Medium,
        description: "Deserializes untrusted data",
    },
    PatternInfo {
        pattern: "open(",
        severity: Severity::Low,
        description: "Touches the filesystem",
    },
];

static MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(PATTERNS.iter().map(|p| p.pattern))
        .expect("static review patterns are valid")
});

/// Annotate code for review. Findings come out highest severity first.
pub fn review_code(code: &str) -> ReviewNotes {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(code.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut findings: Vec<Finding> = MATCHER
        .find_iter(code)
        .map(|mat| {
            let info = &PATTERNS[mat.pattern().as_usize()];
            let line = line_starts.partition_point(|&start| start <= mat.start());
            Finding {
                pattern: info.pattern.to_string(),
                severity: info.severity,
                line,
                description: info.description.to_string(),
            }
        })
        .collect();

    findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.line.cmp(&b.line)));
    findings.dedup_by(|a, b| a.pattern == b.pattern && a.line == b.line);

    ReviewNotes {
        requires_credential: needs_credential(code),
        findings,
    }
}

/// Render code with right-aligned line numbers.
pub fn number_lines(code: &str) -> String {
    let width = code.lines().count().max(1).to_string().len();
    code.lines()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} | {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code() {
        let notes = review_code("def add(a, b):\n    return a + b\n");
        assert!(notes.is_clean());
        assert!(!notes.requires_credential);
    }

    #[test]
    fn test_findings_carry_line_numbers() {
        let code = "import subprocess\nx = 1\nsubprocess.run(['ls'])\nEVAL(x)\n";
        let notes = review_code(code);
        let lines: Vec<(String, usize)> = notes
            .findings
            .iter()
            .map(|f| (f.pattern.clone(), f.line))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("subprocess".to_string(), 1),
                ("subprocess".to_string(), 3),
                ("eval(".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_credential_flag() {
        let notes = review_code("API_KEY = \"YOUR_API_KEY\"\n");
        assert!(notes.requires_credential);
    }

    #[test]
    fn test_number_lines() {
        let code = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        let out = number_lines(&code);
        assert!(out.starts_with(" 1 | l1"));
        assert!(out.ends_with("10 | l10"));
    }
}
