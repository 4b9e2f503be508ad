//! Prompt text sent to the language model.

use crate::tools::ToolRequirement;

pub const TASK_ANALYZER: &str = "\
You break a user's request into the FEWEST subtasks needed to solve it.

Rules:
1. Each subtask must be solvable by a single Python function.
2. Merge related steps: fetching data is one subtask, processing it is another.
3. Do not split simple requests. Never answer the request yourself.

Example:
Input: Perform addition of 5 and 19
Output:
1. Create a calculator that performs basic arithmetic operations.

Example:
Input: Get the last 10 days stock price of Meta and visualize it
Output:
1. Fetch Meta's stock prices for the last 10 days
2. Create a chart of the price trend

Reply with ONLY the numbered subtasks, one per line.";

pub const TOOL_PLANNER: &str = "\
You decide which executable Python tools are needed to solve a task.

Rules:
1. Use the fewest tools possible, never more than three.
2. Tools that need live or external data (weather, prices, search, news) are API \
tools: put 'API' in their name and name the service in the description.
3. Other tools must NOT have 'API' in their name.
4. A visualization tool does its own data processing; do not split them.
5. Descriptions are generic enough to reuse for similar tasks.
6. If the task needs no tool at all, reply with an empty array.

Reply with ONLY a JSON array in a ```json block, for example:
```json
[{\"name\": \"OpenWeatherMap_API_Tool\", \"description\": \"Fetches current weather for a city from the OpenWeatherMap API.\"}]
```";

pub const TOOL_WRITER: &str = "\
You write one self-contained, executable Python script implementing a tool.

Requirements:
- Read the tool's arguments as a JSON object from the TOOL_ARGS environment \
variable when it is set; fall back to sensible values from the originating query.
- Never hardcode values that should be arguments.
- Print the result to stdout. Report errors on stderr and exit non-zero.
- Save charts to image files instead of showing them.
- Use only the standard library unless a package is essential.

Reply with ONLY the code in a ```python block.";

pub const API_TOOL_WRITER: &str = "\
You write one complete, executable Python script that calls a third-party API.

Requirements:
- Import what you need and authenticate with the placeholder \
API_KEY = \"YOUR_API_KEY\"; never invent a real key.
- Read the tool's arguments as a JSON object from the TOOL_ARGS environment variable.
- Make the calls that answer the request and print a concise result to stdout.
- Handle HTTP and decoding errors: print them to stderr and exit non-zero.
- Prefer code shown in the documentation over guesses.

Reply with ONLY Python code.";

pub const SERVICE_IDENTIFIER: &str = "\
Name the single API service provider best suited to the tool below. If the \
description names one, use that. Reply with ONLY the lowercase provider name, \
without words like 'api', 'service' or 'provider'.

Examples: alphavantage, openweathermap, coingecko, newsapi";

pub const TASK_SOLVER: &str = "\
You solve the user's request using the tools provided. Call a tool when it \
helps, read its result, and then answer as directly as possible. If a tool \
fails, say what failed instead of guessing.";

/// Prompt for a general-purpose tool.
pub fn tool_request(
    tool: &ToolRequirement,
    query: &str,
    feedback: Option<&str>,
    previous_code: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Tool name: {}\nTool description: {}\n\nThis tool will be used to solve the following user query: '{}'\n",
        tool.name, tool.description, query
    );
    push_revision(&mut prompt, feedback, previous_code);
    prompt
}

/// Prompt for an API-backed tool, with documentation.
pub fn api_tool_request(
    tool: &ToolRequirement,
    query: &str,
    service: &str,
    documentation: &str,
    feedback: Option<&str>,
    previous_code: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Service: {service}\nTool name: {}\nTool description: {}\nOriginal query: {query}\n\nDocumentation excerpt:\n{documentation}\n",
        tool.name, tool.description
    );
    push_revision(&mut prompt, feedback, previous_code);
    prompt
}

pub fn service_request(tool: &ToolRequirement, query: &str) -> String {
    format!(
        "Tool name: {}\nTool description: {}\nUser query: {}",
        tool.name, tool.description, query
    )
}

pub fn tool_planning_request(query: &str, subtasks: &[String]) -> String {
    format!(
        "User query: {query}\n\nSubtasks:\n{}",
        subtasks.join("\n")
    )
}

fn push_revision(prompt: &mut String, feedback: Option<&str>, previous_code: Option<&str>) {
    if let Some(code) = previous_code.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nA reviewer rejected this previous version:\n```python\n{code}\n```\n"
        ));
    }
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!("\nReviewer feedback to address: {feedback}\n"));
    }
}
