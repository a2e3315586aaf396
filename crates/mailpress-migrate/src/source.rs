use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use mailpress_common::{Error, Result};
use regex::Regex;

/// Files shaped `<digits>_<slug>.sql`. Anything else in a migration
/// directory is ignored during discovery rather than treated as an error.
static MIGRATION_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+_.*\.sql$").expect("valid migration filename pattern"));

const DOWN_SUFFIXES: [&str; 2] = [".down.sql", ".rollback.sql"];

/// One schema migration ready to apply: the identifier is the file stem,
/// the script is the verbatim file contents.
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    pub id: String,
    pub script: String,
    pub description: Option<String>,
}

impl ScriptUnit {
    pub fn new(id: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: script.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build a unit from a migration file; the stem becomes the identifier.
    pub fn from_path(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Other(format!("invalid migration filename: {}", path.display())))?
            .to_string();
        let script = fs::read_to_string(path)?;
        Ok(Self {
            id,
            script,
            description: None,
        })
    }
}

/// Where schema migrations come from: a directory, an embedded bundle, an
/// in-memory list. The manager only needs to enumerate identifiers, fetch a
/// unit, and look up its companion rollback script.
pub trait MigrationSource {
    /// Identifiers of every migration the source knows about, in no
    /// particular order.
    fn list(&self) -> Result<Vec<String>>;

    /// The unit for one identifier.
    fn load(&self, id: &str) -> Result<ScriptUnit>;

    /// The rollback script for one identifier, if the source has one.
    fn down_script(&self, id: &str) -> Result<Option<String>>;
}

/// Filesystem source: a directory of `<id>.sql` scripts with optional
/// `<id>.down.sql` / `<id>.rollback.sql` companions next to them.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MigrationSource for DirSource {
    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !MIGRATION_FILE.is_match(name) {
                continue;
            }
            // The pattern also matches companion rollback files; they are not
            // migrations of their own.
            if DOWN_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".sql") {
                ids.push(stem.to_string());
            }
        }
        Ok(ids)
    }

    fn load(&self, id: &str) -> Result<ScriptUnit> {
        ScriptUnit::from_path(&self.dir.join(format!("{id}.sql")))
    }

    fn down_script(&self, id: &str) -> Result<Option<String>> {
        // Resolved as siblings of the up script, not against the working
        // directory.
        for suffix in DOWN_SUFFIXES {
            let path = self.dir.join(format!("{id}{suffix}"));
            if path.exists() {
                return Ok(Some(fs::read_to_string(path)?));
            }
        }
        Ok(None)
    }
}

/// In-memory source for tests and embedded migration lists.
#[derive(Default)]
pub struct MemorySource {
    units: Vec<MemoryUnit>,
}

struct MemoryUnit {
    id: String,
    up: String,
    down: Option<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, up: impl Into<String>) -> Self {
        self.units.push(MemoryUnit {
            id: id.into(),
            up: up.into(),
            down: None,
        });
        self
    }

    pub fn with_reversible(
        mut self,
        id: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        self.units.push(MemoryUnit {
            id: id.into(),
            up: up.into(),
            down: Some(down.into()),
        });
        self
    }
}

impl MigrationSource for MemorySource {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.units.iter().map(|u| u.id.clone()).collect())
    }

    fn load(&self, id: &str) -> Result<ScriptUnit> {
        self.units
            .iter()
            .find(|u| u.id == id)
            .map(|u| ScriptUnit::new(&u.id, &u.up))
            .ok_or_else(|| Error::Other(format!("unknown migration: {id}")))
    }

    fn down_script(&self, id: &str) -> Result<Option<String>> {
        Ok(self
            .units
            .iter()
            .find(|u| u.id == id)
            .and_then(|u| u.down.clone()))
    }
}
