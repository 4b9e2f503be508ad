//! End-to-end runs of the approval gate against scripted model replies.
//!
//! Tool code is run with `sh` as the interpreter so the tests need nothing
//! beyond a POSIX shell.
//! Run with: cargo test --test approval_gate

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use toolsmith::agent::{
    AgentDeps, ApprovalGate, Decision, EndState, FileSessionStore, GateSettings, MAX_REQUIRED_TOOLS,
    Outcome, Phase, SessionState, Suspension,
};
use toolsmith::llm::Role;
use toolsmith::sandbox::{CredentialSource, SandboxConfig, SandboxExecutor, StaticCredentials};
use toolsmith::testing::{ScriptedLlm, no_credentials};
use toolsmith::tools::{DocPage, RegistryEntry, StaticDocRetriever, ToolRegistry};

const WEATHER_QUERY: &str = "What is the weather in Paris right now?";
const WEATHER_PLAN: &str = "```json\n[{\"name\": \"Weather_API_Tool\", \"description\": \"Fetches current weather for a city\"}]\n```";
const WEATHER_CODE_V1: &str =
    "```python\nAPI_KEY=\"YOUR_API_KEY\"\necho \"sunny\"\n```";
const WEATHER_CODE_V2: &str = "```python\nAPI_KEY=\"YOUR_API_KEY\"\nif [ -z \"$API_KEY\" ]; then echo \"no key\" >&2; exit 1; fi\necho \"sunny, 21C (key ${API_KEY})\"\n```";
const WEATHER_CALL: &str =
    "```json\n{\"tool\": \"Weather_API_Tool\", \"arguments\": {\"city\": \"Paris\"}}\n```";

/// Scratch space shared by every gate built for one test.
struct Harness {
    dir: TempDir,
    exec_timeout: Duration,
    docs: Vec<DocPage>,
    credentials: Arc<dyn CredentialSource>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            exec_timeout: Duration::from_secs(10),
            docs: Vec::new(),
            credentials: no_credentials(),
        }
    }

    fn with_weather_docs(mut self) -> Self {
        self.docs = vec![DocPage {
            url: "https://openweathermap.org/current".to_string(),
            content: "Current weather data. GET /data/2.5/weather?q={city}&appid={API key}"
                .to_string(),
        }];
        self.credentials = Arc::new(StaticCredentials::new("k-123"));
        self
    }

    fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    fn registry_path(&self) -> PathBuf {
        self.dir.path().join("tool_config.json")
    }

    fn registry(&self) -> ToolRegistry {
        ToolRegistry::new(self.registry_path())
    }

    fn sessions_dir(&self) -> PathBuf {
        self.dir.path().join("sessions")
    }

    fn gate(&self, llm: Arc<ScriptedLlm>) -> ApprovalGate {
        let sandbox = SandboxConfig::new(self.dir.path().join("scratch"))
            .with_interpreter("sh")
            .with_exec_timeout(self.exec_timeout);
        ApprovalGate::new(
            AgentDeps {
                llm,
                registry: self.registry(),
                docs: Arc::new(StaticDocRetriever::new(self.docs.clone())),
                executor: Arc::new(SandboxExecutor::new(sandbox, Arc::clone(&self.credentials))),
                store: Arc::new(FileSessionStore::new(self.sessions_dir())),
            },
            GateSettings::default(),
        )
    }
}

fn scripted<const N: usize>(replies: [&str; N]) -> Arc<ScriptedLlm> {
    Arc::new(ScriptedLlm::new(replies))
}

fn suspended(outcome: Outcome) -> Suspension {
    match outcome {
        Outcome::Suspended(suspension) => suspension,
        Outcome::Finished(state) => panic!("expected a suspension, session ended in {}", state.phase),
    }
}

fn finished(outcome: Outcome) -> SessionState {
    match outcome {
        Outcome::Finished(state) => *state,
        Outcome::Suspended(s) => panic!("expected a finished session, suspended on {}", s.tool.name),
    }
}

fn tool_results(state: &SessionState) -> Vec<&str> {
    state
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect()
}

fn registry_names(path: &Path) -> Vec<String> {
    let raw = std::fs::read_to_string(path).unwrap();
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    entries
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_registry_match_skips_generation() {
    let harness = Harness::new();
    harness
        .registry()
        .upsert(RegistryEntry {
            name: "Arithmetic_Tool".to_string(),
            description: "Performs basic arithmetic".to_string(),
            function: "echo 24".to_string(),
        })
        .unwrap();

    let llm = scripted([
        "1. Add 5 and 19",
        "```json\n[{\"name\": \"Calculator_Tool\", \"description\": \"performs basic arithmetic\"}]\n```",
        "```json\n{\"tool\": \"Calculator_Tool\", \"arguments\": {\"a\": 5, \"b\": 19}}\n```",
        "5 + 19 = 24",
    ]);
    let gate = harness.gate(llm.clone());

    let state = finished(gate.start("Perform addition of 5 and 19", "add").await.unwrap());
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.end_state, Some(EndState::ToolsExecuted));
    assert_eq!(state.final_answer.as_deref(), Some("5 + 19 = 24"));
    assert_eq!(state.max_turns, 5);
    assert!(!state.progress.tools_generated);
    assert_eq!(tool_results(&state), vec!["24"]);
    assert_eq!(llm.remaining(), 0);

    // Same code under another name is not written twice.
    assert_eq!(registry_names(&harness.registry_path()), vec!["Arithmetic_Tool"]);
}

#[tokio::test]
async fn test_rejection_regenerates_with_feedback_then_executes() {
    let harness = Harness::new().with_weather_docs();
    let llm = scripted([
        "1. Fetch the current weather for Paris",
        WEATHER_PLAN,
        "OpenWeatherMap",
        WEATHER_CODE_V1,
        "OpenWeatherMap",
        WEATHER_CODE_V2,
        WEATHER_CALL,
        "It is sunny in Paris, 21C.",
    ]);
    let gate = harness.gate(llm.clone());

    let first = suspended(gate.start(WEATHER_QUERY, "weather").await.unwrap());
    assert_eq!(first.tool.name, "Weather_API_Tool");
    assert_eq!(first.turns_remaining, 5);
    assert!(first.notes.requires_credential);

    let second = suspended(
        gate.resume("weather", Decision::reject("missing error handling"))
            .await
            .unwrap(),
    );
    assert_eq!(second.turns_remaining, 4);
    assert!(second.tool.function.contains("exit 1"));

    let revision_prompt = llm.prompts().last().cloned().unwrap();
    assert!(revision_prompt.contains("missing error handling"));
    assert!(revision_prompt.contains("echo \"sunny\""));

    let state = finished(gate.resume("weather", Decision::approve()).await.unwrap());
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.end_state, Some(EndState::ToolsExecuted));
    assert_eq!(state.final_answer.as_deref(), Some("It is sunny in Paris, 21C."));
    assert_eq!(state.max_turns, 4);
    assert_eq!(tool_results(&state), vec!["sunny, 21C (key k-123)"]);
    assert_eq!(llm.remaining(), 0);

    // One entry, holding the approved revision with the placeholder intact.
    let entries = harness.registry().load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Weather_API_Tool");
    assert!(entries[0].function.contains("exit 1"));
    assert!(entries[0].function.contains("YOUR_API_KEY"));
}

#[tokio::test]
async fn test_timed_out_tool_still_finishes() {
    let harness = Harness::new().with_exec_timeout(Duration::from_millis(300));
    let llm = scripted([
        "1. Wait for the slow job",
        "```json\n[{\"name\": \"Slow_Job\", \"description\": \"Waits for a long job\"}]\n```",
        "```python\nsleep 5\necho finished\n```",
        "```json\n{\"tool\": \"Slow_Job\", \"arguments\": {}}\n```",
        "The job did not finish in time.",
    ]);
    let gate = harness.gate(llm);

    suspended(gate.start("Run the slow job", "slow").await.unwrap());
    let state = finished(gate.resume("slow", Decision::approve()).await.unwrap());

    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.final_answer.as_deref(), Some("The job did not finish in time."));
    let results = tool_results(&state);
    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("Error:"), "got {:?}", results[0]);
    assert!(results[0].contains("timed out"));
}

#[tokio::test]
async fn test_generation_failure_on_last_turn_aborts() {
    let harness = Harness::new();
    let llm = scripted([
        "1. Convert the currency",
        "```json\n[{\"name\": \"Currency_Converter\", \"description\": \"Converts between currencies\"}]\n```",
        "I am not able to write that.",
    ]);
    let gate = harness.gate(llm.clone());

    let state = finished(
        gate.start_with_budget("Convert 10 EUR to USD", "fx", 1)
            .await
            .unwrap(),
    );
    assert_eq!(state.phase, Phase::Aborted);
    assert_eq!(state.max_turns, 0);
    assert_eq!(state.end_state, Some(EndState::BudgetExhausted));
    assert!(state.final_answer.is_some());
    assert!(!state.progress.code_generation_success);
    assert_eq!(llm.calls(), 3);
    assert!(harness.registry().load().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_budget_is_refused() {
    let harness = Harness::new();
    let gate = harness.gate(scripted([]));
    assert!(gate.start_with_budget("anything", "zero", 0).await.is_err());
    assert!(gate.session("zero").await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_from_another_process() {
    let harness = Harness::new();
    let first = harness.gate(scripted([
        "1. Count the words",
        "```json\n[{\"name\": \"Word_Counter\", \"description\": \"Counts words\"}]\n```",
        "```python\necho 3\n```",
    ]));
    let suspension = suspended(first.start("How many words in 'a b c'?", "words").await.unwrap());
    assert_eq!(suspension.tool.name, "Word_Counter");
    drop(first);

    assert!(harness.sessions_dir().join("words.json").exists());

    let second = harness.gate(scripted([
        "```json\n{\"tool\": \"Word_Counter\", \"arguments\": {\"text\": \"a b c\"}}\n```",
        "There are 3 words.",
    ]));
    let stored = second.session("words").await.unwrap().unwrap();
    assert_eq!(stored.phase, Phase::HumanReview);

    let state = finished(second.resume("words", Decision::approve()).await.unwrap());
    assert_eq!(state.final_answer.as_deref(), Some("There are 3 words."));

    let reloaded = second.session("words").await.unwrap().unwrap();
    assert_eq!(reloaded.phase, Phase::Done);
    assert!(second.resume("words", Decision::approve()).await.is_err());
}

#[tokio::test]
async fn test_registry_holds_one_entry_per_name() {
    let harness = Harness::new();
    let llm = scripted([
        "1. Reverse the text",
        "```json\n[{\"name\": \"Text_Reverser\", \"description\": \"Reverses text\"}]\n```",
        "```python\necho one\n```",
        "```python\necho two\n```",
        "```python\necho cba\n```",
        "```json\n{\"tool\": \"Text_Reverser\", \"arguments\": {\"text\": \"abc\"}}\n```",
        "cba",
    ]);
    let gate = harness.gate(llm);

    suspended(gate.start("Reverse 'abc'", "rev").await.unwrap());
    suspended(gate.resume("rev", Decision::reject("wrong output")).await.unwrap());
    let last = suspended(gate.resume("rev", Decision::reject("still wrong")).await.unwrap());
    assert_eq!(last.turns_remaining, 3);

    let state = finished(gate.resume("rev", Decision::approve()).await.unwrap());
    assert_eq!(state.end_state, Some(EndState::ToolsExecuted));

    assert_eq!(registry_names(&harness.registry_path()), vec!["Text_Reverser"]);
    let entry = harness.registry().get("Text_Reverser").unwrap().unwrap();
    assert_eq!(entry.function, "echo cba");
    assert_eq!(entry.description, "Reverses text");
}

#[tokio::test]
async fn test_required_tools_are_capped_and_unique() {
    let harness = Harness::new();
    let llm = scripted([
        "1. Parse the report\n2. Summarize it\n3. Format the summary",
        "```json\n[\n  {\"name\": \"Parser\", \"description\": \"Parses reports\"},\n  {\"name\": \"Parser\", \"description\": \"Parses reports again\"},\n  {\"name\": \"Summarizer\", \"description\": \"Summarizes text\"},\n  {\"name\": \"Formatter\", \"description\": \"Formats text\"},\n  {\"name\": \"Counter\", \"description\": \"Counts things\"}\n]\n```",
        "```python\necho parsed\n```",
    ]);
    let gate = harness.gate(llm);

    let suspension = suspended(gate.start("Summarize the report", "report").await.unwrap());
    assert_eq!(suspension.tool.name, "Parser");

    let state = gate.session("report").await.unwrap().unwrap();
    assert!(state.required_tools.len() <= MAX_REQUIRED_TOOLS);
    let names: BTreeSet<&str> = state.required_tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names.len(), state.required_tools.len());
    assert_eq!(names, BTreeSet::from(["Formatter", "Parser", "Summarizer"]));
    assert!(state.subtasks.len() <= 3);
}

#[tokio::test]
async fn test_missing_tools_are_generated_in_order() {
    let harness = Harness::new();
    let llm = scripted([
        "1. Load the CSV file\n2. Sum the price column",
        "```json\n[{\"name\": \"Csv_Loader\", \"description\": \"Loads rows from a CSV file\"}, {\"name\": \"Column_Summer\", \"description\": \"Sums one column\"}]\n```",
        "```python\necho loaded\n```",
        "```python\necho 42\n```",
        "```json\n{\"tool\": \"Column_Summer\", \"arguments\": {\"column\": \"price\"}}\n```",
        "The prices add up to 42.",
    ]);
    let gate = harness.gate(llm.clone());

    let first = suspended(gate.start("Total the price column of prices.csv", "csv").await.unwrap());
    assert_eq!(first.tool.name, "Csv_Loader");

    let second = suspended(gate.resume("csv", Decision::approve()).await.unwrap());
    assert_eq!(second.tool.name, "Column_Summer");
    assert_eq!(second.turns_remaining, 5);

    let stored = gate.session("csv").await.unwrap().unwrap();
    let order: Vec<&str> = stored.required_tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(order, vec![first.tool.name.as_str(), second.tool.name.as_str()]);
    assert!(stored.required_tools[0].is_available);
    assert_eq!(stored.required_tools[0].function, "echo loaded");

    let state = finished(gate.resume("csv", Decision::approve()).await.unwrap());
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.end_state, Some(EndState::ToolsExecuted));
    assert_eq!(state.final_answer.as_deref(), Some("The prices add up to 42."));
    assert_eq!(tool_results(&state), vec!["42"]);
    assert_eq!(llm.remaining(), 0);

    // Each tool was written exactly once.
    let prompts = llm.prompts();
    let generations = |name: &str| {
        let needle = format!("Tool name: {name}");
        prompts.iter().filter(|p| p.contains(&needle)).count()
    };
    assert_eq!(generations("Csv_Loader"), 1);
    assert_eq!(generations("Column_Summer"), 1);

    assert_eq!(
        registry_names(&harness.registry_path()),
        vec!["Csv_Loader", "Column_Summer"]
    );
}
