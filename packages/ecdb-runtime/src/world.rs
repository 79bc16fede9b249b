//! A world: one `Database`, one `IdPool`, the deferred command queues and
//! component-stage arena that feed it, and the Frame Pipeline that drives it.
//!
//! Structural mutation (`add_component`, `remove_component`, `delete_entity`,
//! the deferred form of `create_entity`) is always staged; nothing actually
//! migrates a row or frees an id until [`World::dispatch`] runs between frame
//! events. `get`/`set`/`has_component`/`query` act on whatever is currently
//! committed. Sync processors receive `&mut World` (dispatch aside, nothing
//! else touches the world while one runs); async processors receive `&World`
//! and can only write through a `Dataset`'s projected columns — the type
//! system is the async restriction, not a runtime check.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use ecdb_core::attribute::{AttributeFlags, AttributeId, AttributeRegistry};
use ecdb_core::blueprint::BlueprintRegistry;
use ecdb_core::config::EcdbConfig;
use ecdb_core::database::{Database, TableId};
use ecdb_core::dataset::{self, Dataset};
use ecdb_core::error::EcdbError;
use ecdb_core::filter::Filter;
use ecdb_core::id_pool::{Entity, IdPool};
use ecdb_core::level::{
    read_level_file, write_level_file, ComponentDescription, EntityGroup, FieldFeature,
    FieldSchema, LevelContainer, LevelSchema,
};
use ecdb_core::table::{RowId, ENTITY_COLUMN};
use std::path::Path;

use crate::pipeline::Pipeline;

#[derive(Debug, Clone)]
enum AllocateTarget {
    Default,
    Template(String),
}

#[derive(Debug, Clone)]
struct AllocateCommand {
    entity: Entity,
    target: AllocateTarget,
}

#[derive(Default)]
struct CommandQueues {
    remove: Vec<(Entity, AttributeId)>,
    add: Vec<(Entity, AttributeId)>,
    delete: Vec<Entity>,
    allocate: Vec<AllocateCommand>,
}

/// Owns the live archetype storage for one simulation instance. Created and
/// driven by a [`crate::server::Server`]; `id` is the server-assigned slot.
pub struct World {
    id: u8,
    registry: Arc<AttributeRegistry>,
    blueprints: Arc<BlueprintRegistry>,
    #[allow(dead_code)]
    config: EcdbConfig,
    database: Database,
    id_pool: IdPool,
    entity_map: Vec<Option<(TableId, RowId)>>,
    default_table: TableId,
    queues: CommandQueues,
    stage: HashMap<(Entity, AttributeId), Box<[u8]>>,
    decay_buffers: HashMap<AttributeId, Vec<u8>>,
    pipeline: Pipeline,
    hooks_enabled: bool,
    /// Deduplicated string storage backing `string_atom` components; a
    /// component's stored value is a `u64` index into this table.
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
}

impl World {
    pub fn new(
        id: u8,
        config: EcdbConfig,
        registry: Arc<AttributeRegistry>,
        blueprints: Arc<BlueprintRegistry>,
    ) -> Self {
        let mut database = Database::new(registry.clone(), registry_reserved_columns(&registry))
            .with_partition_capacity(config.standard_partition_capacity as u16);
        let default_table = database.create_table(&[]);
        let id_pool = IdPool::new(config.id_recycle_low_water_mark);
        Self {
            id,
            registry,
            blueprints,
            config,
            database,
            id_pool,
            entity_map: Vec::new(),
            default_table,
            queues: CommandQueues::default(),
            stage: HashMap::new(),
            decay_buffers: HashMap::new(),
            pipeline: Pipeline::new(),
            hooks_enabled: true,
            strings: Vec::new(),
            string_index: HashMap::new(),
        }
    }

    /// Interns `s`, returning a stable atom id. Interning an equal string again
    /// returns the same id — the in-memory half of the level file's string-atom
    /// dedup; store the returned id in a `string_atom`-flagged component via
    /// the usual `add_component`/`set` calls.
    pub fn intern_string(&mut self, s: &str) -> u64 {
        if let Some(&idx) = self.string_index.get(s) {
            return idx as u64;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx as u64
    }

    pub fn resolve_string(&self, atom: u64) -> &str {
        self.strings.get(atom as usize).map(String::as_str).unwrap_or("")
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn init_hooks_enabled(&self) -> bool {
        self.hooks_enabled
    }

    /// Toggles whether init hooks fire on `add_component`/template instantiation
    /// and whether `copy_from` re-runs them for a source world that had them off.
    pub fn set_init_hooks_enabled(&mut self, enabled: bool) {
        self.hooks_enabled = enabled;
    }

    /// Snapshots `src` into `self`: database tables (deep-cloned), id pool, and
    /// entity map. Clears `self`'s pending queues, stage, and decay buffers, since
    /// they don't belong to the snapshot. If `self` has init hooks enabled and
    /// `src` did not, re-runs every component's init hook over the freshly copied
    /// rows — `src` never ran them, so `self` does on its behalf.
    pub(crate) fn copy_from(&mut self, src: &World) {
        src.database.copy(&mut self.database);
        self.id_pool = src.id_pool.clone();
        self.entity_map = src.entity_map.clone();
        self.default_table = src.default_table;
        self.strings = src.strings.clone();
        self.string_index = src.string_index.clone();
        self.stage.clear();
        self.queues = CommandQueues::default();
        self.decay_buffers.clear();
        // dst's pipeline does not carry over src's mid-frame cursor or table caches.
        self.pipeline.reset();
        if self.hooks_enabled && !src.hooks_enabled {
            self.rerun_all_init_hooks();
        }
    }

    fn rerun_all_init_hooks(&mut self) {
        let entity_attr = self.database.reserved_columns()[0];
        let mut table_ids = Vec::new();
        self.database.for_each_table(|id, _| table_ids.push(id));
        for table_id in table_ids {
            let columns = self.database.get_table(table_id).columns().to_vec();
            let partition_count = self.database.get_table(table_id).partition_count();
            for p in 0..partition_count {
                let slot_count = self.database.get_table(table_id).partition(p as u16).slot_count();
                for slot in 0..slot_count {
                    let valid = self.database.get_table(table_id).partition(p as u16).is_valid_row(slot);
                    if !valid {
                        continue;
                    }
                    let row = RowId::new(p as u16, slot);
                    let entity = self.database.get_table(table_id).entity_at(row);
                    for &attr in &columns {
                        if attr == entity_attr {
                            continue;
                        }
                        if let Some(hook) = self.registry.init_hook_of(attr) {
                            let col = self.database.get_table(table_id).attribute_index(attr).unwrap();
                            let ptr = self.database.get_table(table_id).value_pointer(col, row);
                            hook(self as &mut dyn Any, entity, ptr);
                        }
                    }
                }
            }
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn pipeline(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Arms the frame pipeline: resets its cursor and rebuilds every
    /// processor's table cache against the current database.
    pub fn begin_frame(&mut self) {
        self.pipeline.begin(&self.database);
    }

    /// Runs every frame event up to and including `event_name`.
    pub fn run_thru(&mut self, event_name: &str) {
        let mut pipeline = std::mem::take(&mut self.pipeline);
        pipeline.run_thru(event_name, self);
        self.pipeline = pipeline;
    }

    /// Runs every remaining frame event.
    pub fn run_remaining(&mut self) {
        let mut pipeline = std::mem::take(&mut self.pipeline);
        pipeline.run_remaining(self);
        self.pipeline = pipeline;
    }

    pub fn reset_pipeline(&mut self) {
        self.pipeline.reset();
    }

    pub fn cache_table(&mut self, table: TableId, signature: &ecdb_core::signature::Signature) {
        self.pipeline.cache_table(table, signature);
    }

    fn row_of(&self, entity: Entity) -> Option<(TableId, RowId)> {
        if !self.id_pool.is_valid(entity) {
            return None;
        }
        self.entity_map.get(entity.index() as usize).copied().flatten()
    }

    fn ensure_entity_map_capacity(&mut self, index: u32) {
        let needed = index as usize + 1;
        if self.entity_map.len() < needed {
            self.entity_map.resize(needed, None);
        }
    }

    // ---- queries -----------------------------------------------------

    pub fn has_component(&self, entity: Entity, attribute: AttributeId) -> bool {
        match self.row_of(entity) {
            Some((table, _)) => self.database.get_table(table).has_attribute(attribute),
            None => false,
        }
    }

    pub fn get<T: Copy + 'static>(&self, entity: Entity, attribute: AttributeId) -> T {
        let (table_id, row) = self
            .row_of(entity)
            .expect("World::get on an entity with no live row");
        let table = self.database.get_table(table_id);
        let col = table
            .attribute_index(attribute)
            .expect("World::get: entity's table does not carry this component");
        debug_assert_eq!(table.column_size(col), std::mem::size_of::<T>());
        let ptr = table.value_pointer(col, row);
        // Safety: `ptr` addresses a live row's column of exactly `size_of::<T>()`
        // bytes; exclusivity across writers is the batch-acceptance rule's job,
        // not this call's.
        unsafe { *(ptr as *const T) }
    }

    /// Writes `value` into an already-present component, immediately (not staged).
    /// Does not migrate rows — the component must already exist on the entity.
    pub fn set<T: Copy + 'static>(&mut self, entity: Entity, attribute: AttributeId, value: T) {
        let (table_id, row) = self
            .row_of(entity)
            .expect("World::set on an entity with no live row");
        let table = self.database.get_table_mut(table_id);
        let col = table
            .attribute_index(attribute)
            .expect("World::set: entity's table does not carry this component");
        let size = std::mem::size_of::<T>();
        debug_assert_eq!(table.column_size(col), size);
        let bytes = unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, size) };
        table.write_value(col, row, bytes);
        table.mark_modified(row);
    }

    pub fn mark_as_modified(&mut self, entity: Entity) {
        if let Some((table_id, row)) = self.row_of(entity) {
            self.database.get_table_mut(table_id).mark_modified(row);
        }
    }

    pub fn query(&self, filter: &Filter) -> Dataset<'_> {
        dataset::query(&self.database, filter)
    }

    pub fn get_decay_buffer(&self, attribute: AttributeId) -> &[u8] {
        self.decay_buffers.get(&attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cleared only by the `Server`, once per frame, after every world's end-of-frame
    /// dispatch has run.
    pub(crate) fn clear_decay_buffers(&mut self) {
        self.decay_buffers.clear();
    }

    // ---- entity lifecycle ---------------------------------------------

    /// `immediate = true` allocates and attaches a row right now, bypassing the
    /// deferred queue, for the common "I need to use it this frame" case.
    /// `immediate = false` queues an allocate command for the next `dispatch`.
    pub fn create_entity(&mut self, immediate: bool) -> Entity {
        let (entity, _reused) = self.id_pool.allocate();
        self.ensure_entity_map_capacity(entity.index());
        if immediate {
            self.instantiate_default(entity);
        } else {
            self.queues.allocate.push(AllocateCommand {
                entity,
                target: AllocateTarget::Default,
            });
        }
        entity
    }

    pub fn create_entity_from_template(&mut self, template: &str, immediate: bool) -> Entity {
        let (entity, _reused) = self.id_pool.allocate();
        self.ensure_entity_map_capacity(entity.index());
        if immediate {
            self.instantiate_template(entity, template);
        } else {
            self.queues.allocate.push(AllocateCommand {
                entity,
                target: AllocateTarget::Template(template.to_string()),
            });
        }
        entity
    }

    pub fn delete_entity(&mut self, entity: Entity) {
        self.queues.delete.push(entity);
    }

    pub fn remove_component(&mut self, entity: Entity, attribute: AttributeId) {
        self.queues.remove.push((entity, attribute));
    }

    /// Stages `value` for `attribute` on `entity`, running the component's init
    /// hook (if any) immediately against the staged bytes, and returns a pointer
    /// to those bytes good until the next `dispatch`. The write only becomes
    /// visible on the entity's actual row once `dispatch` processes the add.
    pub fn add_component<T: Copy + 'static>(
        &mut self,
        entity: Entity,
        attribute: AttributeId,
        value: T,
    ) -> &mut T {
        let size = std::mem::size_of::<T>();
        debug_assert_eq!(self.registry.size_of(attribute), size);
        let mut bytes = vec![0u8; size].into_boxed_slice();
        if size > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(&value as *const T as *const u8, bytes.as_mut_ptr(), size);
            }
        }
        let key = (entity, attribute);
        self.stage.insert(key, bytes);
        let ptr = self.stage.get_mut(&key).unwrap().as_mut_ptr();
        if self.hooks_enabled {
            if let Some(hook) = self.registry.init_hook_of(attribute) {
                hook(self as &mut dyn Any, entity, ptr);
            }
        }
        self.queues.add.push(key);
        // Safety: `ptr` addresses a `Box<[u8]>` owned by `self.stage`; later
        // inserts only move the hashmap's bucket array, never this allocation, so
        // the pointer stays valid until `dispatch` drains and drops the stage.
        unsafe { &mut *(ptr as *mut T) }
    }

    fn instantiate_default(&mut self, entity: Entity) {
        let row = self.database.get_table_mut(self.default_table).add_row(&self.registry);
        self.database
            .get_table_mut(self.default_table)
            .write_value(ENTITY_COLUMN, row, &entity.to_bits().to_ne_bytes());
        self.entity_map[entity.index() as usize] = Some((self.default_table, row));
    }

    fn instantiate_template(&mut self, entity: Entity, name: &str) {
        let Some(blueprint) = self.blueprints.lookup_blueprint(name) else {
            tracing::warn!(template = name, "unknown blueprint, falling back to default entity");
            self.instantiate_default(entity);
            return;
        };
        let components = blueprint.components();
        let table_id = self.database.create_table(&components);
        let row = self.database.get_table_mut(table_id).add_row(&self.registry);
        for &attr in &components {
            if let Some(bytes) = blueprint.override_of(attr) {
                let col = self.database.get_table(table_id).attribute_index(attr).unwrap();
                self.database.get_table_mut(table_id).write_value(col, row, bytes);
            }
        }
        self.database
            .get_table_mut(table_id)
            .write_value(ENTITY_COLUMN, row, &entity.to_bits().to_ne_bytes());
        self.entity_map[entity.index() as usize] = Some((table_id, row));

        if self.hooks_enabled {
            for &attr in &components {
                if let Some(hook) = self.registry.init_hook_of(attr) {
                    let col = self.database.get_table(table_id).attribute_index(attr).unwrap();
                    let ptr = self.database.get_table(table_id).value_pointer(col, row);
                    hook(self as &mut dyn Any, entity, ptr);
                }
            }
        }
    }

    // ---- dispatch -------------------------------------------------------

    /// Drains and applies only the queued add-component commands, leaving the
    /// remove/delete/allocate queues untouched. Called by the `Server` between
    /// `OnBeginFrame`→`OnFrame` and `OnFrame`→`OnEndFrame`, so a processor in
    /// one event observes components a processor in the previous event added.
    pub(crate) fn dispatch_adds(&mut self) {
        let mut add = std::mem::take(&mut self.queues.add);
        add.sort_by_key(|(e, _)| e.index());
        let mut i = 0;
        while i < add.len() {
            let entity = add[i].0;
            let mut attrs = Vec::new();
            while i < add.len() && add[i].0 == entity {
                attrs.push(add[i].1);
                i += 1;
            }
            self.apply_add_components(entity, &attrs);
        }
    }

    /// Applies every queued structural command in the spec's fixed order:
    /// remove-components, add-components, delete-entities, allocate-entities,
    /// defragment every table, reset the stage arena. Decay buffers are *not*
    /// cleared here — only the `Server` clears them, once per frame.
    pub fn dispatch(&mut self) {
        let mut queues = std::mem::take(&mut self.queues);

        queues.remove.sort_by_key(|(e, _)| e.index());
        let mut i = 0;
        while i < queues.remove.len() {
            let entity = queues.remove[i].0;
            let mut attrs = Vec::new();
            while i < queues.remove.len() && queues.remove[i].0 == entity {
                attrs.push(queues.remove[i].1);
                i += 1;
            }
            self.apply_remove_components(entity, &attrs);
        }

        queues.add.sort_by_key(|(e, _)| e.index());
        let mut i = 0;
        while i < queues.add.len() {
            let entity = queues.add[i].0;
            let mut attrs = Vec::new();
            while i < queues.add.len() && queues.add[i].0 == entity {
                attrs.push(queues.add[i].1);
                i += 1;
            }
            self.apply_add_components(entity, &attrs);
        }

        for entity in queues.delete.drain(..) {
            self.apply_delete_entity(entity);
        }

        for cmd in queues.allocate.drain(..) {
            match cmd.target {
                AllocateTarget::Default => self.instantiate_default(cmd.entity),
                AllocateTarget::Template(name) => self.instantiate_template(cmd.entity, &name),
            }
        }

        self.defragment_all();
        self.stage.clear();
    }

    fn apply_remove_components(&mut self, entity: Entity, attrs: &[AttributeId]) {
        let Some((table_id, row)) = self.row_of(entity) else { return };
        let table = self.database.get_table(table_id);
        let new_components: Vec<AttributeId> = table
            .columns()
            .iter()
            .copied()
            .filter(|c| !self.database.reserved_columns().contains(c) && !attrs.contains(c))
            .collect();
        let (dst, outcome) = self.database.migrate_row(table_id, row, &new_components);
        self.entity_map[entity.index() as usize] = Some((dst, outcome.row));
    }

    fn apply_add_components(&mut self, entity: Entity, attrs: &[AttributeId]) {
        let Some((table_id, row)) = self.row_of(entity) else { return };
        let table = self.database.get_table(table_id);
        let mut new_components: Vec<AttributeId> = table
            .columns()
            .iter()
            .copied()
            .filter(|c| !self.database.reserved_columns().contains(c))
            .collect();
        for &attr in attrs {
            if !new_components.contains(&attr) {
                new_components.push(attr);
            }
        }
        let (dst, outcome) = self.database.migrate_row(table_id, row, &new_components);
        self.entity_map[entity.index() as usize] = Some((dst, outcome.row));
        for &attr in attrs {
            if let Some(bytes) = self.stage.get(&(entity, attr)) {
                let col = self.database.get_table(dst).attribute_index(attr).unwrap();
                self.database.get_table_mut(dst).write_value(col, outcome.row, bytes);
            }
        }
    }

    fn apply_delete_entity(&mut self, entity: Entity) {
        let Some((table_id, row)) = self.row_of(entity) else { return };
        let decayed = self.database.get_table_mut(table_id).remove_row(row, &self.registry);
        for (attr, bytes) in decayed {
            self.decay_buffers.entry(attr).or_default().extend_from_slice(&bytes);
        }
        self.entity_map[entity.index() as usize] = None;
        self.id_pool.deallocate(entity);
    }

    fn defragment_all(&mut self) {
        let entity_map = &mut self.entity_map;
        let mut table_ids = Vec::new();
        self.database.for_each_table(|id, _| table_ids.push(id));
        for table_id in table_ids {
            let table = self.database.get_table_mut(table_id);
            table.defragment(|from, to| {
                if let Some(slot) = entity_map.iter_mut().find(|s| **s == Some((table_id, from))) {
                    *slot = Some((table_id, to));
                }
            });
        }
    }

    // ---- level import/export --------------------------------------------

    /// Reads `path`, resets the database, and instantiates every saved row. A missing
    /// file is `Ok(None)` — the recoverable-I/O-as-null-result contract — leaving the
    /// world untouched; any other failure (bad magic, checksum, schema version) is
    /// `Err(EcdbError::SchemaDrift)`.
    pub fn preload_level(&mut self, path: &Path) -> Result<Option<Vec<Entity>>, EcdbError> {
        let Some(container) = read_level_file(path)? else {
            return Ok(None);
        };
        Ok(Some(self.load_level(&container)))
    }

    /// Snapshots every live row and writes it to `path`.
    pub fn export_level(&self, path: &Path) -> Result<(), EcdbError> {
        let container = self.save_level();
        write_level_file(path, &container)
    }

    /// Resets the database and instantiates every row in `container`, allocating a
    /// fresh entity per row and running each loaded component's init hook (if
    /// hooks are enabled). Returns the live entities in save order, so `EntityId`
    /// fields (whole-component save-time sequential indices) can be cross-patched.
    fn load_level(&mut self, container: &LevelContainer) -> Vec<Entity> {
        self.database.reset();
        self.strings = container.strings.clone();
        self.string_index = self.strings.iter().enumerate().map(|(i, s)| (s.clone(), i as u32)).collect();

        let mut order = Vec::new();
        let mut entity_patches: Vec<(TableId, usize, RowId, u32)> = Vec::new();
        let mut string_patches: Vec<(TableId, usize, RowId, u64)> = Vec::new();
        let mut hook_targets: Vec<(TableId, RowId, Entity, Vec<AttributeId>)> = Vec::new();

        for group in &container.groups {
            let attrs: Vec<AttributeId> = group
                .component_indices
                .iter()
                .filter_map(|&i| self.registry.lookup_by_name(&container.schema.components[i as usize].name))
                .collect();
            let table_id = self.database.create_table(&attrs);
            for row_idx in 0..group.num_rows as usize {
                let row = self.database.get_table_mut(table_id).add_row(&self.registry);
                let mut written = Vec::new();
                for (blob_idx, &comp_idx) in group.component_indices.iter().enumerate() {
                    let desc = &container.schema.components[comp_idx as usize];
                    let size = desc.type_size as usize;
                    if size == 0 {
                        continue;
                    }
                    let Some(attr) = self.registry.lookup_by_name(&desc.name) else { continue };
                    let Some(col) = self.database.get_table(table_id).attribute_index(attr) else {
                        continue;
                    };
                    let blob = &group.column_blobs[blob_idx];
                    let bytes = &blob[row_idx * size..(row_idx + 1) * size];
                    self.database.get_table_mut(table_id).write_value(col, row, bytes);
                    written.push(attr);
                    if size == 4 && desc.fields.len() == 1 && desc.fields[0].feature == FieldFeature::EntityId {
                        let raw = u32::from_ne_bytes(bytes.try_into().unwrap());
                        entity_patches.push((table_id, col, row, raw));
                    }
                    if size == 8 && desc.fields.len() == 1 && desc.fields[0].feature == FieldFeature::StringAtom {
                        let raw = u64::from_ne_bytes(bytes.try_into().unwrap());
                        string_patches.push((table_id, col, row, raw));
                    }
                }
                let (entity, _) = self.id_pool.allocate();
                self.ensure_entity_map_capacity(entity.index());
                self.database
                    .get_table_mut(table_id)
                    .write_value(ENTITY_COLUMN, row, &entity.to_bits().to_ne_bytes());
                self.entity_map[entity.index() as usize] = Some((table_id, row));
                order.push(entity);
                hook_targets.push((table_id, row, entity, written));
            }
        }

        for (table_id, col, row, saved_order_index) in entity_patches {
            if let Some(&live) = order.get(saved_order_index as usize) {
                self.database
                    .get_table_mut(table_id)
                    .write_value(col, row, &live.to_bits().to_ne_bytes());
            }
        }

        // Restore string_atom fields to atoms valid in this world's string table;
        // an out-of-range index (a corrupt or foreign-origin level) patches to atom 0.
        for (table_id, col, row, atom) in string_patches {
            let patched = if (atom as usize) < self.strings.len() { atom } else { 0 };
            self.database
                .get_table_mut(table_id)
                .write_value(col, row, &patched.to_ne_bytes());
        }

        if self.hooks_enabled {
            for (table_id, row, entity, attrs) in hook_targets {
                for attr in attrs {
                    if let Some(hook) = self.registry.init_hook_of(attr) {
                        let col = self.database.get_table(table_id).attribute_index(attr).unwrap();
                        let ptr = self.database.get_table(table_id).value_pointer(col, row);
                        hook(self as &mut dyn Any, entity, ptr);
                    }
                }
            }
        }

        order
    }

    /// Snapshots every live row into a [`LevelContainer`]. The reserved `Entity`
    /// column is not saved as a component — entity identity is reassigned fresh on
    /// the next `load_level`.
    pub fn save_level(&self) -> LevelContainer {
        let entity_attr = self.database.reserved_columns()[0];
        let mut components: Vec<ComponentDescription> = Vec::new();
        let mut index_of: HashMap<AttributeId, usize> = HashMap::new();
        let mut groups = Vec::new();

        self.database.for_each_table(|_id, table| {
            let present: Vec<AttributeId> =
                table.columns().iter().copied().filter(|&a| a != entity_attr).collect();
            if present.is_empty() {
                return;
            }
            let component_indices: Vec<u32> = present
                .iter()
                .map(|&attr| {
                    *index_of.entry(attr).or_insert_with(|| {
                        let idx = components.len();
                        let flags = self.registry.flags_of(attr);
                        let feature = if flags.contains(AttributeFlags::STRING_ATOM) {
                            FieldFeature::StringAtom
                        } else if flags.contains(AttributeFlags::ENTITY_ID) {
                            FieldFeature::EntityId
                        } else {
                            FieldFeature::Undefined
                        };
                        components.push(ComponentDescription {
                            name: self.registry.name_of(attr),
                            type_size: self.registry.size_of(attr) as u32,
                            fields: vec![FieldSchema {
                                name: "value".into(),
                                feature,
                            }],
                        });
                        idx
                    }) as u32
                })
                .collect();

            let mut num_rows = 0u32;
            let mut column_blobs: Vec<Vec<u8>> = present.iter().map(|_| Vec::new()).collect();
            for partition in table.partitions() {
                for slot in 0..partition.slot_count() {
                    if !partition.is_valid_row(slot) {
                        continue;
                    }
                    num_rows += 1;
                    for (i, &attr) in present.iter().enumerate() {
                        let col = table.attribute_index(attr).unwrap();
                        column_blobs[i].extend_from_slice(&partition.read_value(col, slot));
                    }
                }
            }
            groups.push(EntityGroup {
                component_indices,
                num_rows,
                column_blobs,
            });
        });

        LevelContainer {
            schema: LevelSchema {
                version: LevelSchema::CURRENT_VERSION,
                components,
            },
            groups,
            // Already deduplicated by `intern_string`; column blobs for string_atom
            // fields hold indices directly into this table.
            strings: self.strings.clone(),
        }
    }
}

fn registry_reserved_columns(registry: &Arc<AttributeRegistry>) -> Vec<AttributeId> {
    use ecdb_core::attribute::AttributeFlags;
    vec![
        registry.register_type::<u32>("Entity", 0, AttributeFlags::empty(), None),
        registry.register_type::<[f32; 3]>("Position", [0.0; 3], AttributeFlags::empty(), None),
        registry.register_type::<[f32; 4]>("Orientation", [0.0, 0.0, 0.0, 1.0], AttributeFlags::empty(), None),
        registry.register_type::<[f32; 3]>("Scale", [1.0; 3], AttributeFlags::empty(), None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecdb_core::attribute::AttributeFlags;
    use ecdb_core::filter::AccessMode;

    fn test_world() -> (World, Arc<AttributeRegistry>, AttributeId) {
        let registry = Arc::new(AttributeRegistry::new());
        registry_reserved_columns(&registry);
        let velocity = registry.register_type::<f32>("Velocity", 0.0, AttributeFlags::empty(), None);
        let blueprints = Arc::new(BlueprintRegistry::new());
        let world = World::new(0, EcdbConfig::default(), registry.clone(), blueprints);
        (world, registry, velocity)
    }

    #[test]
    fn immediate_create_is_queryable_right_away() {
        let (mut world, _registry, _velocity) = test_world();
        let e = world.create_entity(true);
        assert!(world.has_component(e, world.database.reserved_columns()[1]));
    }

    #[test]
    fn deferred_create_needs_dispatch() {
        let (mut world, _registry, _velocity) = test_world();
        let e = world.create_entity(false);
        assert!(!world.has_component(e, world.database.reserved_columns()[1]));
        world.dispatch();
        assert!(world.has_component(e, world.database.reserved_columns()[1]));
    }

    #[test]
    fn add_then_dispatch_migrates_and_writes_value() {
        let (mut world, _registry, velocity) = test_world();
        let e = world.create_entity(true);
        world.add_component(e, velocity, 3.5f32);
        assert!(!world.has_component(e, velocity));
        world.dispatch();
        assert!(world.has_component(e, velocity));
        assert_eq!(world.get::<f32>(e, velocity), 3.5);
    }

    #[test]
    fn remove_then_dispatch_drops_component() {
        let (mut world, _registry, velocity) = test_world();
        let e = world.create_entity(true);
        world.add_component(e, velocity, 1.0f32);
        world.dispatch();
        world.remove_component(e, velocity);
        world.dispatch();
        assert!(!world.has_component(e, velocity));
    }

    #[test]
    fn delete_frees_id_and_buffers_decay() {
        let registry = Arc::new(AttributeRegistry::new());
        registry_reserved_columns(&registry);
        let clip = registry.register_type::<u32>("Clip", 0, AttributeFlags::DECAY, None);
        let blueprints = Arc::new(BlueprintRegistry::new());
        let mut world = World::new(0, EcdbConfig::default(), registry, blueprints);
        let e = world.create_entity(true);
        world.add_component(e, clip, 99u32);
        world.dispatch();
        world.delete_entity(e);
        world.dispatch();
        assert_eq!(world.get_decay_buffer(clip), 99u32.to_ne_bytes());
        assert!(!world.id_pool.is_valid(e));
    }

    #[test]
    fn query_finds_matching_rows() {
        let (mut world, _registry, velocity) = test_world();
        let e = world.create_entity(true);
        world.add_component(e, velocity, 7.0f32);
        world.dispatch();
        let filter = Filter::compile(&[(velocity, AccessMode::Read)], &[]);
        let dataset = world.query(&filter);
        assert_eq!(dataset.total_instances(), 1);
    }

    #[test]
    fn level_roundtrip_preserves_row_count() {
        let (mut world, _registry, velocity) = test_world();
        let e1 = world.create_entity(true);
        world.add_component(e1, velocity, 1.0f32);
        let e2 = world.create_entity(true);
        world.add_component(e2, velocity, 2.0f32);
        world.dispatch();

        let container = world.save_level();
        let entities = world.load_level(&container);
        assert_eq!(entities.len(), 2);
        let filter = Filter::compile(&[(velocity, AccessMode::Read)], &[]);
        assert_eq!(world.query(&filter).total_instances(), 2);
    }

    #[test]
    fn remove_component_not_present_is_a_no_op() {
        // Removing a component the entity never had collapses the target
        // signature back onto the entity's current table; migrate_instance
        // must treat src == dst as a no-op, not an assertion failure.
        let (mut world, _registry, velocity) = test_world();
        let e = world.create_entity(true);
        world.remove_component(e, velocity);
        world.dispatch();
        assert!(!world.has_component(e, velocity));
    }

    #[test]
    fn string_atom_fields_round_trip_through_a_level() {
        let registry = Arc::new(AttributeRegistry::new());
        registry_reserved_columns(&registry);
        let label = registry.register_type::<u64>("Label", 0, AttributeFlags::STRING_ATOM, None);
        let blueprints = Arc::new(BlueprintRegistry::new());
        let mut world = World::new(0, EcdbConfig::default(), registry, blueprints);

        let atom = world.intern_string("torch");
        let e = world.create_entity(true);
        world.add_component(e, label, atom);
        world.dispatch();

        let container = world.save_level();
        assert_eq!(container.strings, vec!["torch".to_string()]);
        let feature = container
            .schema
            .components
            .iter()
            .find(|c| c.name == "Label")
            .unwrap()
            .fields[0]
            .feature;
        assert_eq!(feature, ecdb_core::level::FieldFeature::StringAtom);

        let mut reloaded = World::new(
            0,
            EcdbConfig::default(),
            world.registry.clone(),
            world.blueprints.clone(),
        );
        let entities = reloaded.load_level(&container);
        assert_eq!(reloaded.resolve_string(reloaded.get::<u64>(entities[0], label)), "torch");
    }
}
