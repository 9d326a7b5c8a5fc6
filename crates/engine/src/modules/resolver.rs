//! Fixed-point dependency resolution.
//!
//! Each pass collects every remaining module whose dependencies have all been
//! processed. A pass that collects nothing while modules remain means the
//! rest can never load: a cycle, or a dependency that is not a candidate.

use std::collections::HashSet;

use aethelon_domain::ModuleDescriptor;

/// A module that could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckModule {
    pub id: String,
    /// Everything the module declared
    pub dependencies: Vec<String>,
    /// The declared dependencies that were never processed
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Module ids per pass, each pass ordered by load priority then id
    pub batches: Vec<Vec<String>>,
    pub stuck: Vec<StuckModule>,
}

impl Resolution {
    /// Flattened load order.
    pub fn order(&self) -> Vec<&str> {
        self.batches
            .iter()
            .flat_map(|batch| batch.iter().map(String::as_str))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.stuck.is_empty()
    }
}

/// Order `candidates` so that every module follows its dependencies.
///
/// Dependencies name logical modules, so a legacy variant satisfies a
/// dependency on its logical name.
pub fn resolve(candidates: &[ModuleDescriptor]) -> Resolution {
    let mut remaining: Vec<&ModuleDescriptor> = candidates.iter().collect();
    let mut processed: HashSet<String> = HashSet::new();
    let mut resolution = Resolution::default();

    while !remaining.is_empty() {
        let (mut ready, blocked): (Vec<&ModuleDescriptor>, Vec<&ModuleDescriptor>) = remaining
            .into_iter()
            .partition(|desc| desc.dependencies.iter().all(|dep| processed.contains(dep)));

        if ready.is_empty() {
            resolution.stuck = blocked
                .into_iter()
                .map(|desc| StuckModule {
                    id: desc.id(),
                    dependencies: desc.dependencies.clone(),
                    unresolved: desc
                        .dependencies
                        .iter()
                        .filter(|dep| !processed.contains(*dep))
                        .cloned()
                        .collect(),
                })
                .collect();
            resolution.stuck.sort_by(|a, b| a.id.cmp(&b.id));
            break;
        }

        ready.sort_by(|a, b| {
            a.load_priority
                .cmp(&b.load_priority)
                .then_with(|| a.id().cmp(&b.id()))
        });
        for desc in &ready {
            processed.insert(desc.logical_name());
        }
        resolution
            .batches
            .push(ready.iter().map(|desc| desc.id()).collect());
        remaining = blocked;
    }

    resolution
}
