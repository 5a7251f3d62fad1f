//! The multi-target registry (§4.1, §4.6). Concurrent reads, creates and
//! removes never block each other; only attach/detach (target topology
//! changes, driven by `migrate_target`) touch an entry's presence at all —
//! the same "readers never wait on each other, structural change is the
//! rare case" discipline the original's provider-wide rwlock enforces,
//! here expressed as a concurrent map instead of one coarse lock.

use bake_backend::Backend;
use bake_common::{BakeError, TargetId};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct TargetRegistry {
    targets: DashMap<TargetId, Arc<dyn Backend>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        TargetRegistry {
            targets: DashMap::new(),
        }
    }

    pub fn attach(&self, target_id: TargetId, backend: Arc<dyn Backend>) {
        self.targets.insert(target_id, backend);
    }

    pub fn detach(&self, target_id: &TargetId) -> Option<Arc<dyn Backend>> {
        self.targets.remove(target_id).map(|(_, backend)| backend)
    }

    pub fn get(&self, target_id: &TargetId) -> Result<Arc<dyn Backend>, BakeError> {
        self.targets
            .get(target_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BakeError::UnknownTarget(target_id.to_string()))
    }

    pub fn probe(&self, max_targets: usize) -> Vec<TargetId> {
        self.targets
            .iter()
            .take(max_targets)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
