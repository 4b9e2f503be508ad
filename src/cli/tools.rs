//! Registry inspection commands.

use clap::Subcommand;

use crate::tools::{ToolKind, ToolRegistry, number_lines, review_code};

#[derive(Subcommand, Debug, Clone)]
pub enum ToolsCommand {
    /// List stored tools
    List {
        /// Show descriptions
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print one tool's code with review notes
    Show { name: String },
}

pub fn run_tools_command(cmd: ToolsCommand, registry: &ToolRegistry) -> anyhow::Result<()> {
    match cmd {
        ToolsCommand::List { verbose } => list_tools(registry, verbose),
        ToolsCommand::Show { name } => show_tool(registry, &name),
    }
}

fn list_tools(registry: &ToolRegistry, verbose: bool) -> anyhow::Result<()> {
    let mut entries = registry.load()?;
    if entries.is_empty() {
        println!("No tools stored in {}", registry.path().display());
        return Ok(());
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Tools in {}:", registry.path().display());
    println!();
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in entries {
        let lines = entry.function.lines().count();
        println!(
            "  {:width$}  {:13}  {} lines",
            entry.name,
            ToolKind::classify(&entry.name).to_string(),
            lines
        );
        if verbose && !entry.description.is_empty() {
            println!("  {:width$}  {}", "", entry.description);
        }
    }
    Ok(())
}

fn show_tool(registry: &ToolRegistry, name: &str) -> anyhow::Result<()> {
    let entry = registry
        .get(name)?
        .ok_or_else(|| anyhow::anyhow!("no tool named '{name}' in {}", registry.path().display()))?;

    println!("{}", entry.name);
    println!("  {}", entry.description);
    println!();
    println!("{}", number_lines(&entry.function));

    let notes = review_code(&entry.function);
    if notes.requires_credential || !notes.is_clean() {
        println!();
    }
    if notes.requires_credential {
        println!("  needs an API key at run time");
    }
    for finding in notes.findings {
        println!(
            "  {} line {}: {} ({})",
            finding.severity, finding.line, finding.description, finding.pattern
        );
    }
    Ok(())
}
