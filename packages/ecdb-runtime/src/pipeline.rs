//! The Frame Pipeline: named, ordered Frame Events, each holding ordered
//! Batches of Processors. A processor's filter decides which tables it reads;
//! a batch accepts a processor only if it doesn't write-conflict with anyone
//! already in the batch, so same-batch processors are safe to run in
//! parallel. `OnBeginFrame` (order 10), `OnFrame` (order 100), and
//! `OnEndFrame` (order 200) always exist; callers may register more before
//! `begin`.

use std::sync::Arc;

use ecdb_core::database::{Database, TableId};
use ecdb_core::dataset::{self, Dataset};
use ecdb_core::filter::Filter;
use ecdb_core::signature::Signature;

use crate::world::World;

pub type ProcessorFn = Arc<dyn Fn(&World, &mut Dataset) + Send + Sync>;

struct Processor {
    name: String,
    filter: Filter,
    callback: ProcessorFn,
    cached_tables: Vec<TableId>,
}

struct Batch {
    is_async: bool,
    processors: Vec<Processor>,
}

impl Batch {
    fn accepts(&self, filter: &Filter) -> bool {
        self.processors.iter().all(|p| !p.filter.write_conflicts_with(filter))
    }
}

struct FrameEvent {
    name: String,
    order: i32,
    batches: Vec<Batch>,
}

/// Orchestrates a world's per-frame processor execution. Owned by the `World`
/// it drives; pulled out via `mem::take` for the duration of a run so
/// processor callbacks can take `&World`/`&mut World` without the pipeline
/// itself aliasing the world it's stored inside.
pub struct Pipeline {
    events: Vec<FrameEvent>,
    cursor: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        let mut pipeline = Self {
            events: Vec::new(),
            cursor: 0,
        };
        pipeline.register_event("OnBeginFrame", 10);
        pipeline.register_event("OnFrame", 100);
        pipeline.register_event("OnEndFrame", 200);
        pipeline
    }

    /// Registers an additional named Frame Event at `order`. No-op if the name
    /// already exists. Must be called before `begin`.
    pub fn register_event(&mut self, name: &str, order: i32) {
        if self.events.iter().any(|e| e.name == name) {
            return;
        }
        let event = FrameEvent {
            name: name.to_string(),
            order,
            batches: Vec::new(),
        };
        let pos = self.events.partition_point(|e| e.order <= order);
        self.events.insert(pos, event);
    }

    /// Attaches a processor to the named event, in a batch ordered by `order`.
    /// Joins the first same-order batch it doesn't write-conflict with, or
    /// opens a new one right after same-order batches that rejected it.
    pub fn attach_processor(
        &mut self,
        event_name: &str,
        order: i32,
        is_async: bool,
        name: &str,
        filter: Filter,
        callback: ProcessorFn,
    ) {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.name == event_name)
            .unwrap_or_else(|| panic!("unknown frame event: {event_name}"));
        let processor = Processor {
            name: name.to_string(),
            filter,
            callback,
            cached_tables: Vec::new(),
        };
        for batch in &mut event.batches {
            if batch.is_async == is_async && batch.accepts(&processor.filter) {
                batch.processors.push(processor);
                return;
            }
        }
        event.batches.push(Batch {
            is_async,
            processors: vec![processor],
        });
        let _ = order; // batch position tracks insertion order; explicit order is advisory
    }

    /// Rebuilds every processor's cached table list from scratch.
    pub fn prefilter(&mut self, database: &Database) {
        for event in &mut self.events {
            for batch in &mut event.batches {
                for processor in &mut batch.processors {
                    processor.cached_tables =
                        database.query(processor.filter.inclusive(), processor.filter.exclusive());
                }
            }
        }
    }

    /// Incrementally extends every processor's cache with `table` if its
    /// signature now matches, called whenever a table is freshly created.
    pub fn cache_table(&mut self, table: TableId, signature: &Signature) {
        for event in &mut self.events {
            for batch in &mut event.batches {
                for processor in &mut batch.processors {
                    if processor.filter.matches(signature) && !processor.cached_tables.contains(&table) {
                        processor.cached_tables.push(table);
                    }
                }
            }
        }
    }

    /// Arms the pipeline for a new frame: resets the cursor and does a full
    /// prefilter so every processor starts the frame with an up-to-date cache.
    pub fn begin(&mut self, database: &Database) {
        self.cursor = 0;
        self.prefilter(database);
    }

    /// Runs every event up to and including `event_name`.
    pub fn run_thru(&mut self, event_name: &str, world: &mut World) {
        while self.cursor < self.events.len() {
            let name = self.events[self.cursor].name.clone();
            self.run_event(self.cursor, world);
            self.cursor += 1;
            if name == event_name {
                break;
            }
        }
    }

    /// Runs every event from the cursor to the end.
    pub fn run_remaining(&mut self, world: &mut World) {
        while self.cursor < self.events.len() {
            self.run_event(self.cursor, world);
            self.cursor += 1;
        }
    }

    fn run_event(&mut self, index: usize, world: &mut World) {
        let event = &self.events[index];
        tracing::debug!(event = %event.name, batches = event.batches.len(), "running frame event");
        for batch in &event.batches {
            if batch.is_async {
                run_batch_async(batch, world);
            } else {
                run_batch_sync(batch, world);
            }
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.events.len()
    }

    /// Number of batches currently scheduled under the named event. Exposed for
    /// diagnostics and tests — the batch count is a direct consequence of the
    /// write-disjointness rule `attach_processor` enforces.
    pub fn batch_count(&self, event_name: &str) -> usize {
        self.events
            .iter()
            .find(|e| e.name == event_name)
            .map(|e| e.batches.len())
            .unwrap_or(0)
    }
}

fn run_one(processor: &Processor, world: &World) {
    let mut dataset = dataset::query_tables(world.database(), &processor.filter, processor.cached_tables.clone());
    (processor.callback)(world, &mut dataset);
}

fn run_batch_sync(batch: &Batch, world: &mut World) {
    for processor in &batch.processors {
        run_one(processor, world);
    }
}

#[cfg(feature = "parallel")]
fn run_batch_async(batch: &Batch, world: &mut World) {
    use rayon::prelude::*;
    let world_ref: &World = world;
    batch.processors.par_iter().for_each(|p| run_one(p, world_ref));
}

#[cfg(not(feature = "parallel"))]
fn run_batch_async(batch: &Batch, world: &mut World) {
    run_batch_sync(batch, world);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecdb_core::attribute::{AttributeFlags, AttributeRegistry};
    use ecdb_core::blueprint::BlueprintRegistry;
    use ecdb_core::config::EcdbConfig;
    use ecdb_core::filter::AccessMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_world() -> (World, ecdb_core::attribute::AttributeId) {
        let registry = Arc::new(AttributeRegistry::new());
        registry.register_type::<u32>("Entity", 0, AttributeFlags::empty(), None);
        registry.register_type::<[f32; 3]>("Position", [0.0; 3], AttributeFlags::empty(), None);
        registry.register_type::<[f32; 4]>("Orientation", [0.0; 4], AttributeFlags::empty(), None);
        registry.register_type::<[f32; 3]>("Scale", [1.0; 3], AttributeFlags::empty(), None);
        let velocity = registry.register_type::<f32>("Velocity", 0.0, AttributeFlags::empty(), None);
        let blueprints = Arc::new(BlueprintRegistry::new());
        (World::new(0, EcdbConfig::default(), registry, blueprints), velocity)
    }

    #[test]
    fn default_events_are_ordered() {
        let pipeline = Pipeline::new();
        let names: Vec<_> = pipeline.events.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["OnBeginFrame", "OnFrame", "OnEndFrame"]);
    }

    #[test]
    fn conflicting_writers_land_in_different_batches() {
        let mut pipeline = Pipeline::new();
        let velocity = ecdb_core::attribute::AttributeId(4);
        let write_filter = Filter::compile(&[(velocity, AccessMode::Write)], &[]);
        pipeline.attach_processor("OnFrame", 100, true, "a", write_filter.clone(), Arc::new(|_, _| {}));
        pipeline.attach_processor("OnFrame", 100, true, "b", write_filter, Arc::new(|_, _| {}));
        let event = pipeline.events.iter().find(|e| e.name == "OnFrame").unwrap();
        assert_eq!(event.batches.len(), 2);
    }

    #[test]
    fn run_thru_invokes_processor_once_per_entity() {
        let (mut world, velocity) = test_world();
        let e = world.create_entity(true);
        world.add_component(e, velocity, 2.0f32);
        world.dispatch();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let filter = Filter::compile(&[(velocity, AccessMode::Read)], &[]);
        world.pipeline().attach_processor(
            "OnFrame",
            100,
            false,
            "count",
            filter,
            Arc::new(move |_world, dataset| {
                counter_clone.fetch_add(dataset.total_instances(), Ordering::SeqCst);
            }),
        );
        world.begin_frame();
        world.run_thru("OnEndFrame");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
