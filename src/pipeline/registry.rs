// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Stage registry
//!
//! Keeps stages in registration order. The executor takes a snapshot of a
//! phase before running it, so stages added or removed while a phase runs
//! only affect later phases and later passes.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::events::{EventSender, PipelineEvent};
use super::Phase;
use crate::errors::{BuildlineError, BuildlineResult};
use crate::stages::Stage;

/// Whether two handles point to the same stage instance
pub fn same_stage(a: &Arc<dyn Stage>, b: &Arc<dyn Stage>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Ordered collection of stages
pub struct StageRegistry {
    stages: RwLock<Vec<Arc<dyn Stage>>>,
    events: EventSender,
}

impl StageRegistry {
    pub fn new(events: EventSender) -> Self {
        Self {
            stages: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Append a stage
    ///
    /// Several stages may share a kind and phase; they run in the order they
    /// were registered. Registering the same instance twice is an error.
    pub fn register(&self, stage: Arc<dyn Stage>) -> BuildlineResult<()> {
        if !stage.state().attach() {
            return Err(BuildlineError::DuplicateStage {
                kind: stage.kind().to_string(),
            });
        }

        let (kind, phase) = (stage.kind().to_string(), stage.phase());
        self.stages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);

        debug!(%kind, %phase, "stage registered");
        self.events.emit(PipelineEvent::StageAdded { kind, phase });
        Ok(())
    }

    /// Remove a stage; returns whether it was present
    pub fn unregister(&self, stage: &Arc<dyn Stage>) -> bool {
        let removed = {
            let mut stages = self.stages.write().unwrap_or_else(PoisonError::into_inner);
            match stages.iter().position(|s| same_stage(s, stage)) {
                Some(index) => Some(stages.remove(index)),
                None => None,
            }
        };

        let Some(removed) = removed else {
            return false;
        };

        removed.state().detach();
        debug!(kind = %removed.kind(), "stage unregistered");
        self.events.emit(PipelineEvent::StageRemoved {
            kind: removed.kind().to_string(),
            phase: removed.phase(),
        });
        true
    }

    /// Stages of `phase` in registration order
    pub fn list(&self, phase: Phase) -> Vec<Arc<dyn Stage>> {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|stage| stage.phase() == phase)
            .cloned()
            .collect()
    }

    /// Every stage in execution order
    pub fn all(&self) -> Vec<Arc<dyn Stage>> {
        let mut stages = self
            .stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // Stable, so registration order survives within a phase.
        stages.sort_by_key(|stage| stage.phase());
        stages
    }

    /// First registered stage of `kind`
    pub fn find(&self, kind: &str) -> BuildlineResult<Arc<dyn Stage>> {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|stage| stage.kind() == kind)
            .cloned()
            .ok_or_else(|| BuildlineError::StageNotFound {
                kind: kind.to_string(),
            })
    }

    pub fn contains(&self, stage: &Arc<dyn Stage>) -> bool {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| same_stage(s, stage))
    }

    pub fn len(&self) -> usize {
        self.stages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every stage
    pub fn clear(&self) -> Vec<Arc<dyn Stage>> {
        let removed = std::mem::take(
            &mut *self.stages.write().unwrap_or_else(PoisonError::into_inner),
        );
        for stage in &removed {
            stage.state().detach();
            self.events.emit(PipelineEvent::StageRemoved {
                kind: stage.kind().to_string(),
                phase: stage.phase(),
            });
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::BuildProgress;
    use crate::stages::StageState;
    use async_trait::async_trait;

    struct Noop {
        kind: &'static str,
        phase: Phase,
        state: StageState,
    }

    fn noop(kind: &'static str, phase: Phase) -> Arc<dyn Stage> {
        Arc::new(Noop {
            kind,
            phase,
            state: StageState::new(),
        })
    }

    #[async_trait]
    impl Stage for Noop {
        fn kind(&self) -> &str {
            self.kind
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn state(&self) -> &StageState {
            &self.state
        }

        async fn build(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
            Ok(())
        }
    }

    fn kinds(stages: &[Arc<dyn Stage>]) -> Vec<&str> {
        stages.iter().map(|s| s.kind()).collect()
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = StageRegistry::new(EventSender::new());
        registry.register(noop("b", Phase::Build)).unwrap();
        registry.register(noop("a", Phase::Build)).unwrap();
        registry.register(noop("conf", Phase::Configure)).unwrap();

        assert_eq!(kinds(&registry.list(Phase::Build)), vec!["b", "a"]);
        assert_eq!(kinds(&registry.all()), vec!["conf", "b", "a"]);
    }

    #[test]
    fn test_same_instance_twice_is_rejected() {
        let registry = StageRegistry::new(EventSender::new());
        let stage = noop("x", Phase::Build);
        registry.register(stage.clone()).unwrap();

        let err = registry.register(stage).unwrap_err();
        assert!(matches!(err, BuildlineError::DuplicateStage { kind } if kind == "x"));
    }

    #[test]
    fn test_duplicate_kinds_are_legal() {
        let registry = StageRegistry::new(EventSender::new());
        registry.register(noop("command", Phase::Build)).unwrap();
        registry.register(noop("command", Phase::Build)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = StageRegistry::new(EventSender::new());
        let stage = noop("x", Phase::Build);
        registry.register(stage.clone()).unwrap();

        assert!(registry.unregister(&stage));
        assert!(!registry.unregister(&stage));
        assert!(registry.is_empty());
        assert!(!stage.state().is_attached());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_changes() {
        let registry = StageRegistry::new(EventSender::new());
        let first = noop("first", Phase::Build);
        registry.register(first.clone()).unwrap();

        let snapshot = registry.list(Phase::Build);
        registry.unregister(&first);
        registry.register(noop("late", Phase::Build)).unwrap();

        assert_eq!(kinds(&snapshot), vec!["first"]);
        assert_eq!(kinds(&registry.list(Phase::Build)), vec!["late"]);
    }

    #[test]
    fn test_find_missing_kind() {
        let registry = StageRegistry::new(EventSender::new());
        assert!(matches!(
            registry.find("meson-build"),
            Err(BuildlineError::StageNotFound { .. })
        ));
    }

    #[test]
    fn test_events_are_published() {
        let events = EventSender::new();
        let mut rx = events.subscribe();
        let registry = StageRegistry::new(events);
        let stage = noop("x", Phase::Install);

        registry.register(stage.clone()).unwrap();
        registry.unregister(&stage);

        assert!(matches!(rx.try_recv().unwrap(), PipelineEvent::StageAdded { phase: Phase::Install, .. }));
        assert!(matches!(rx.try_recv().unwrap(), PipelineEvent::StageRemoved { .. }));
    }
}
