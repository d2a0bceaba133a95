//! Built-in jobs and the bootstrap list that registers them.

mod capa;

pub use capa::*;

use std::sync::Arc;

use crate::job::{Job, JobRegistry};

/// Register every built-in job. Called once at startup; the registry holds
/// nothing until this runs.
pub fn register_builtin_jobs(registry: &mut JobRegistry) {
    let builtins: [(&str, fn() -> Box<dyn Job>); 1] =
        [("bots.capa.pje", || -> Box<dyn Job> { Box::new(CaseCoverJob::new()) })];

    for (path, make) in builtins {
        match registry.register_path(path, Arc::new(make)) {
            Some(name) => tracing::debug!(job = %name, path = %path, "Registered built-in job"),
            None => tracing::warn!(path = %path, "Built-in job path does not name a job"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve_by_category_and_system() {
        let mut registry = JobRegistry::new();
        register_builtin_jobs(&mut registry);

        assert_eq!(registry.names(), vec!["capa_pje".to_string()]);
        let job = registry.resolve("capa", "pje").unwrap();
        assert_eq!(job.name(), "capa_pje");
        assert!(registry.resolve("pje", "capa").is_ok());
    }
}
