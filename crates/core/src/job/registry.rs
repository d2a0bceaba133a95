use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{Job, JobError};

/// Builds a fresh job instance per dispatch.
pub type JobFactory = Arc<dyn Fn() -> Box<dyn Job> + Send + Sync>;

/// Number of parts of a name reserved for shared base implementations.
const BASE_NAME_PARTS: usize = 4;

/// Registry name for a job defined at `path` (`.` or `::` separated).
///
/// `bots.capa.pje` becomes `capa_pje`. Returns `None` for paths that only
/// hold shared bases: anything under `master` or `controllers`, paths that
/// repeat a segment, and names that still have four parts once the
/// `admin_` prefix and `_main` suffix are removed.
pub fn derive_job_name(path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(|c| c == '.' || c == ':')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.len() < 3 || segments.contains(&"master") || segments.contains(&"controllers") {
        return None;
    }
    let mut seen = segments.clone();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != segments.len() {
        return None;
    }

    let tail = if segments.len() == 3 {
        &segments[1..]
    } else {
        &segments[2..]
    };
    let joined = tail.join("_");
    if joined.contains("__") {
        return None;
    }

    let name = joined.replace("admin_", "").replace("_main", "");
    if name.is_empty() || name.split('_').count() == BASE_NAME_PARTS {
        return None;
    }
    Some(name)
}

/// Job factories by name. Owned by the composition root and populated by
/// an explicit bootstrap list.
#[derive(Default, Clone)]
pub struct JobRegistry {
    factories: BTreeMap<String, JobFactory>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under an explicit name. A later registration replaces an
    /// earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: JobFactory) {
        let name = name.into();
        debug!(job = %name, "Registering job");
        self.factories.insert(name, factory);
    }

    /// Register under the name derived from `path`. Returns the name, or
    /// `None` when the path denotes a base that is not dispatchable.
    pub fn register_path(&mut self, path: &str, factory: JobFactory) -> Option<String> {
        let name = derive_job_name(path)?;
        self.register(name.clone(), factory);
        Some(name)
    }

    /// Find the job for `{category}_{system}`, then `{system}_{category}`.
    pub fn resolve(&self, category: &str, system: &str) -> Result<Box<dyn Job>, JobError> {
        let primary = format!("{}_{}", category, system);
        let fallback = format!("{}_{}", system, category);
        self.factories
            .get(&primary)
            .or_else(|| self.factories.get(&fallback))
            .map(|factory| factory())
            .ok_or_else(|| JobError::NotRegistered {
                category: category.to_string(),
                system: system.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
