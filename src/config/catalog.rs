use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::lab::{demo_lab, LabDefinition};
use crate::protocol::{LabError, LabResult};

/// Read-only set of lab definitions the server can hand out.
#[derive(Debug, Clone, Default)]
pub struct LabCatalog {
    labs: BTreeMap<String, Arc<LabDefinition>>,
}

impl LabCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding only the built-in demo lab.
    pub fn builtin() -> Self {
        let lab = demo_lab();
        let mut catalog = Self::new();
        catalog.labs.insert(lab.id.clone(), Arc::new(lab));
        catalog
    }

    pub fn from_labs<I>(labs: I) -> LabResult<Self>
    where
        I: IntoIterator<Item = LabDefinition>,
    {
        let mut catalog = Self::new();
        for lab in labs {
            catalog.insert(lab)?;
        }
        Ok(catalog)
    }

    /// Loads every `*.json` file under `dir`. A file that fails to parse or
    /// validate fails the whole load.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> LabResult<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| LabError::Config(format!("Failed to read labs directory: {}", e)))?;
            let path = entry.path();

            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let content = std::fs::read_to_string(path)
                .map_err(|e| LabError::Config(format!("Failed to read lab file {}: {}", path.display(), e)))?;
            let lab: LabDefinition = serde_json::from_str(&content)
                .map_err(|e| LabError::InvalidLab(format!("{}: {}", path.display(), e)))?;

            let dangling = lab.environment.dangling_children();
            if !dangling.is_empty() {
                warn!(lab = %lab.id, paths = ?dangling, "Lab lists directory entries that do not exist");
            }

            debug!(lab = %lab.id, file = %path.display(), "Loaded lab definition");
            catalog.insert(lab)?;
        }

        info!(count = catalog.len(), dir = %dir.display(), "Lab catalog loaded");
        Ok(catalog)
    }

    /// Loads from `dir` when given, otherwise serves the demo lab. An empty
    /// directory also falls back to the demo lab.
    pub fn load_or_builtin(dir: Option<&Path>) -> LabResult<Self> {
        let catalog = match dir {
            Some(dir) => Self::load_from_dir(dir)?,
            None => Self::new(),
        };

        if catalog.is_empty() {
            info!("No lab definitions found, serving the built-in demo lab");
            return Ok(Self::builtin());
        }

        Ok(catalog)
    }

    pub fn insert(&mut self, mut lab: LabDefinition) -> LabResult<()> {
        lab.validate()?;
        lab.allowed_commands = lab.allowed_commands.iter().map(|c| c.to_lowercase()).collect();

        if self.labs.contains_key(&lab.id) {
            return Err(LabError::InvalidLab(format!("duplicate lab id '{}'", lab.id)));
        }

        self.labs.insert(lab.id.clone(), Arc::new(lab));
        Ok(())
    }

    pub fn get(&self, lab_id: &str) -> LabResult<Arc<LabDefinition>> {
        self.labs
            .get(lab_id)
            .cloned()
            .ok_or_else(|| LabError::LabNotFound(lab_id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.labs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labs.is_empty()
    }
}
