//! Durable registry of generated tools.
//!
//! The registry is one JSON array of `{name, description, function}`
//! records. Every update is a full read-modify-write under an exclusive
//! lock on a sibling `.lock` file, and the new content is written to a
//! temporary file and renamed into place. Concurrent sessions storing the
//! same tool therefore serialise, and the last write wins.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::tools::requirement::ToolRequirement;

/// One persisted tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub function: String,
}

impl From<&ToolRequirement> for RegistryEntry {
    fn from(tool: &ToolRequirement) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            function: tool.function.clone(),
        }
    }
}

/// What a store call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
    /// Already written during the current resolution pass.
    AlreadyStored,
}

/// File-backed tool registry.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    path: PathBuf,
}

impl ToolRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. A missing or blank file is an empty registry.
    pub fn load(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let lock = self.open_lock()?;
        fs4::FileExt::lock_shared(&lock).map_err(|e| self.io_err(e))?;
        let result = self.read_entries();
        let _ = fs4::FileExt::unlock(&lock);
        result
    }

    /// Look an entry up by exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.load()?.into_iter().find(|e| e.name == name))
    }

    /// Insert or replace the entry with the same name.
    pub fn upsert(&self, entry: RegistryEntry) -> Result<StoreOutcome, RegistryError> {
        if entry.name.trim().is_empty() {
            return Err(RegistryError::InvalidEntry {
                name: entry.name,
                reason: "tool has no name".to_string(),
            });
        }
        if entry.function.trim().is_empty() {
            return Err(RegistryError::InvalidEntry {
                name: entry.name,
                reason: "tool has no code".to_string(),
            });
        }

        let lock = self.open_lock()?;
        fs4::FileExt::lock_exclusive(&lock).map_err(|e| self.io_err(e))?;
        let result = self.read_entries().and_then(|mut entries| {
            let outcome = match entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => {
                    *existing = entry.clone();
                    StoreOutcome::Updated
                }
                None => {
                    entries.push(entry.clone());
                    StoreOutcome::Inserted
                }
            };
            self.write_entries(&entries).map(|()| outcome)
        });
        let _ = fs4::FileExt::unlock(&lock);

        if let Ok(outcome) = &result {
            tracing::info!(tool = %entry.name, ?outcome, "Stored tool in registry");
        }
        result
    }

    /// Persist an available requirement once per resolution pass.
    ///
    /// `stored` holds the names already written in the current pass; the
    /// caller owns it and clears it when a new pass begins.
    pub fn store(
        &self,
        tool: &ToolRequirement,
        stored: &mut BTreeSet<String>,
    ) -> Result<StoreOutcome, RegistryError> {
        if stored.contains(&tool.name) {
            tracing::debug!(tool = %tool.name, "Tool already stored in this pass");
            return Ok(StoreOutcome::AlreadyStored);
        }
        let outcome = self.upsert(RegistryEntry::from(tool))?;
        stored.insert(tool.name.clone());
        Ok(outcome)
    }

    fn read_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| RegistryError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write_entries(&self, entries: &[RegistryEntry]) -> Result<(), RegistryError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries
            .serialize(&mut ser)
            .map_err(|e| RegistryError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        buf.push(b'\n');

        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(&buf).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn open_lock(&self) -> Result<File, RegistryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.with_extension("json.lock"))
            .map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Find the registry entry matching a requirement.
///
/// Exact case-insensitive name match wins, then case-insensitive
/// description match. Entries without code never match.
pub fn find_match<'a>(
    entries: &'a [RegistryEntry],
    name: &str,
    description: &str,
) -> Option<&'a RegistryEntry> {
    let usable = || entries.iter().filter(|e| !e.function.trim().is_empty());
    let name = name.trim().to_lowercase();
    let description = description.trim().to_lowercase();

    if let Some(hit) = usable().find(|e| e.name.trim().to_lowercase() == name) {
        return Some(hit);
    }
    if description.is_empty() {
        return None;
    }
    usable().find(|e| e.description.trim().to_lowercase() == description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str, description: &str, function: &str) -> RegistryEntry {
        RegistryEntry {
            name: name.to_string(),
            description: description.to_string(),
            function: function.to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("nested/tool_config.json"));
        assert!(registry.load().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("tool_config.json"));

        assert_eq!(
            registry.upsert(entry("Weather_API_Tool", "weather", "v1")).unwrap(),
            StoreOutcome::Inserted
        );
        assert_eq!(
            registry.upsert(entry("Adder", "adds", "print(1)")).unwrap(),
            StoreOutcome::Inserted
        );
        assert_eq!(
            registry.upsert(entry("Weather_API_Tool", "weather", "v2")).unwrap(),
            StoreOutcome::Updated
        );

        let entries = registry.load().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].function, "v2");
        assert_eq!(registry.get("Adder").unwrap().unwrap().function, "print(1)");
    }

    #[test]
    fn test_upsert_rejects_empty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("tool_config.json"));
        assert!(registry.upsert(entry("", "d", "code")).is_err());
        assert!(registry.upsert(entry("Named", "d", "  ")).is_err());
        assert!(registry.load().unwrap().is_empty());
    }

    #[test]
    fn test_store_skips_names_already_stored_in_pass() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("tool_config.json"));
        let mut tool = ToolRequirement::new("Adder", "adds");
        tool.make_available("print(24)");

        let mut stored = BTreeSet::new();
        assert_eq!(registry.store(&tool, &mut stored).unwrap(), StoreOutcome::Inserted);
        assert_eq!(registry.store(&tool, &mut stored).unwrap(), StoreOutcome::AlreadyStored);

        stored.clear();
        assert_eq!(registry.store(&tool, &mut stored).unwrap(), StoreOutcome::Updated);
    }

    #[test]
    fn test_corrupt_file_is_reported_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let registry = ToolRegistry::new(&path);

        assert!(matches!(registry.load(), Err(RegistryError::Corrupt { .. })));
        assert!(registry.upsert(entry("A", "a", "x")).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_reads_records_with_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_config.json");
        std::fs::write(
            &path,
            r#"[{"name": "Adder", "description": "adds", "is_available": true, "function": "x"}]"#,
        )
        .unwrap();
        let entries = ToolRegistry::new(&path).load().unwrap();
        assert_eq!(entries, vec![entry("Adder", "adds", "x")]);
    }

    #[test]
    fn test_written_file_uses_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_config.json");
        ToolRegistry::new(&path).upsert(entry("A", "a", "x")).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n        \"name\": \"A\""));
    }

    #[test]
    fn test_find_match_prefers_name_then_description() {
        let entries = vec![
            entry("Arithmetic_Tool", "Performs basic arithmetic operations", "calc"),
            entry("Adder", "adds two numbers", "add"),
            entry("Empty", "adds two numbers", ""),
        ];

        let by_name = find_match(&entries, "adder", "something else").unwrap();
        assert_eq!(by_name.function, "add");

        let by_description =
            find_match(&entries, "Calculator_Tool", "performs BASIC arithmetic operations").unwrap();
        assert_eq!(by_description.name, "Arithmetic_Tool");

        assert!(find_match(&entries, "Empty", "").is_none());
        assert!(find_match(&entries, "Nothing", "").is_none());
    }

    #[test]
    fn test_find_match_folds_non_ascii_names() {
        let entries = vec![entry("Übersetzer_Tool", "translates text", "translate")];

        let hit = find_match(&entries, "übersetzer_tool", "").unwrap();
        assert_eq!(hit.function, "translate");
    }

    #[test]
    fn test_concurrent_writers_do_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool_config.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = ToolRegistry::new(&path);
                std::thread::spawn(move || {
                    let name = if i % 2 == 0 { "Shared" } else { "Other" };
                    registry.upsert(entry(name, "d", &format!("v{i}"))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = ToolRegistry::new(&path).load().unwrap();
        assert_eq!(entries.len(), 2);
    }
}
