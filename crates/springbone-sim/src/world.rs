//! Bevy resource holding the batch scheduler and the entity bookkeeping
//! needed to map chain nodes back onto ECS entities.

use std::collections::{BTreeMap, HashMap};

use bevy::prelude::{Entity, Resource};
use springbone_chain::{BatchScheduler, InlineExecutor, SchedulerOptions, TaskPoolExecutor};
use springbone_core::config::SpringBoneConfig;
use springbone_core::types::{ChainId, NodeId};

// ---------------------------------------------------------------------------
// ChainEntities
// ---------------------------------------------------------------------------

/// Entities participating in one registered chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainEntities {
    /// Bone entities in chain array order.
    pub bones: Vec<Entity>,
    /// One entry per root bone.
    pub anchors: Vec<Entity>,
    pub colliders: Vec<Entity>,
}

// ---------------------------------------------------------------------------
// SpringBoneWorld
// ---------------------------------------------------------------------------

/// All spring-bone state in a single Bevy resource.
#[derive(Resource, Debug)]
pub struct SpringBoneWorld {
    pub scheduler: BatchScheduler,
    /// Node id → entity, for every bone, anchor and collider ever registered.
    pub entities: HashMap<NodeId, Entity>,
    pub chains: BTreeMap<ChainId, ChainEntities>,
}

impl SpringBoneWorld {
    pub fn new(scheduler: BatchScheduler) -> Self {
        Self {
            scheduler,
            entities: HashMap::new(),
            chains: BTreeMap::new(),
        }
    }

    /// Scheduler on a private task pool when `config.parallel`, inline
    /// otherwise.
    pub fn from_config(config: &SpringBoneConfig) -> Self {
        let scheduler = if config.parallel {
            BatchScheduler::new(TaskPoolExecutor::new())
        } else {
            BatchScheduler::new(InlineExecutor)
        };
        Self::new(scheduler.with_options(SchedulerOptions {
            reset_on_divergence: config.reset_on_divergence,
        }))
    }

    #[must_use]
    pub fn entity(&self, node: NodeId) -> Option<Entity> {
        self.entities.get(&node).copied()
    }

    #[must_use]
    pub fn chain_entities(&self, chain: ChainId) -> Option<&ChainEntities> {
        self.chains.get(&chain)
    }

    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Chain driving `entity`, if any.
    #[must_use]
    pub fn chain_of(&self, entity: Entity) -> Option<ChainId> {
        self.chains
            .iter()
            .find(|(_, c)| c.bones.contains(&entity))
            .map(|(id, _)| *id)
    }
}

impl Default for SpringBoneWorld {
    fn default() -> Self {
        Self::new(BatchScheduler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_picks_executor() {
        let parallel = SpringBoneWorld::from_config(&SpringBoneConfig::default());
        assert_eq!(parallel.scheduler.executor_name(), "task_pool");

        let config = SpringBoneConfig {
            parallel: false,
            reset_on_divergence: false,
            ..SpringBoneConfig::default()
        };
        let inline = SpringBoneWorld::from_config(&config);
        assert_eq!(inline.scheduler.executor_name(), "inline");
        assert!(!inline.scheduler.options().reset_on_divergence);
    }

    #[test]
    fn default_is_empty() {
        let world = SpringBoneWorld::default();
        assert_eq!(world.chain_count(), 0);
        assert!(world.scheduler.is_empty());
        assert!(world.entity(NodeId(1)).is_none());
        assert!(world.chain_of(Entity::PLACEHOLDER).is_none());
    }
}
