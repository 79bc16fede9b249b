//! Owns every live world and drives the per-frame dispatch. At most
//! `config.max_worlds` worlds exist at once; decay buffers are cleared here,
//! once per frame, after every world's deferred commands have dispatched.

use std::sync::Arc;

use ecdb_core::attribute::AttributeRegistry;
use ecdb_core::blueprint::BlueprintRegistry;
pub use ecdb_core::config::EcdbConfig;
use ecdb_core::error::EcdbError;

use crate::world::World;

pub struct Server {
    config: EcdbConfig,
    registry: Arc<AttributeRegistry>,
    blueprints: Arc<BlueprintRegistry>,
    worlds: Vec<Option<World>>,
}

impl Server {
    pub fn new(config: EcdbConfig) -> Self {
        Self::with_registries(config, Arc::new(AttributeRegistry::new()), Arc::new(BlueprintRegistry::new()))
    }

    pub fn with_registries(
        config: EcdbConfig,
        registry: Arc<AttributeRegistry>,
        blueprints: Arc<BlueprintRegistry>,
    ) -> Self {
        Self {
            config,
            registry,
            blueprints,
            worlds: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AttributeRegistry> {
        &self.registry
    }

    pub fn blueprints(&self) -> &Arc<BlueprintRegistry> {
        &self.blueprints
    }

    pub fn world_count(&self) -> usize {
        self.worlds.iter().filter(|w| w.is_some()).count()
    }

    /// Allocates a new world in the first free slot. Fails once `max_worlds`
    /// live worlds already exist.
    pub fn create_world(&mut self) -> Result<u8, EcdbError> {
        if let Some(slot) = self.worlds.iter().position(|w| w.is_none()) {
            self.worlds[slot] = Some(World::new(
                slot as u8,
                self.config.clone(),
                self.registry.clone(),
                self.blueprints.clone(),
            ));
            return Ok(slot as u8);
        }
        if self.worlds.len() >= self.config.max_worlds {
            return Err(EcdbError::WorldCapacityExceeded(format!(
                "server already holds {} worlds",
                self.config.max_worlds
            )));
        }
        let id = self.worlds.len() as u8;
        self.worlds.push(Some(World::new(
            id,
            self.config.clone(),
            self.registry.clone(),
            self.blueprints.clone(),
        )));
        Ok(id)
    }

    pub fn destroy_world(&mut self, id: u8) {
        if let Some(slot) = self.worlds.get_mut(id as usize) {
            *slot = None;
        }
    }

    pub fn world(&self, id: u8) -> Option<&World> {
        self.worlds.get(id as usize).and_then(|w| w.as_ref())
    }

    pub fn world_mut(&mut self, id: u8) -> Option<&mut World> {
        self.worlds.get_mut(id as usize).and_then(|w| w.as_mut())
    }

    /// Copies `src`'s database/id-pool/entity-map into `dst`, conditionally
    /// re-running init hooks per [`World::copy_from`]'s contract.
    pub fn override_world(&mut self, src: u8, dst: u8) {
        assert_ne!(src, dst, "override_world between identical world ids");
        let (lo, hi) = if src < dst { (src, dst) } else { (dst, src) };
        let (left, right) = self.worlds.split_at_mut(hi as usize);
        let lo_slot = &mut left[lo as usize];
        let hi_slot = &mut right[0];
        let (src_world, dst_world): (&World, &mut World) = if src < dst {
            (
                lo_slot.as_ref().expect("override_world: missing src world"),
                hi_slot.as_mut().expect("override_world: missing dst world"),
            )
        } else {
            (
                hi_slot.as_ref().expect("override_world: missing src world"),
                lo_slot.as_mut().expect("override_world: missing dst world"),
            )
        };
        dst_world.copy_from(src_world);
    }

    /// Arms every world's pipeline, runs `OnBeginFrame`, then dispatches
    /// queued add-component commands so `OnFrame` sees them.
    pub fn begin_frame(&mut self) {
        for world in self.worlds.iter_mut().flatten() {
            world.begin_frame();
            world.run_thru("OnBeginFrame");
            world.dispatch_adds();
        }
    }

    /// Runs `OnFrame` for every world, then dispatches queued add-component
    /// commands so `OnEndFrame` sees them.
    pub fn sim_frame(&mut self) {
        for world in self.worlds.iter_mut().flatten() {
            world.run_thru("OnFrame");
            world.dispatch_adds();
        }
    }

    /// Runs whatever frame events remain (normally just `OnEndFrame`), applies
    /// the frame's deferred structural commands, resets the pipeline cursor,
    /// and clears decay buffers — the one step only the server performs.
    pub fn end_frame(&mut self) {
        for world in self.worlds.iter_mut().flatten() {
            world.run_remaining();
            world.dispatch();
            world.reset_pipeline();
            world.clear_decay_buffers();
        }
    }

    /// Runs one full frame: begin, sim, end, across every live world.
    pub fn run_frame(&mut self) {
        self.begin_frame();
        self.sim_frame();
        self.end_frame();
    }
}
