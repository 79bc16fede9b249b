//! The live runtime built on `ecdb-core`: a `World` owning one database plus
//! its deferred command queues and component-stage arena, a Frame Pipeline of
//! named, ordered processor batches, and a `Server` that owns up to
//! `config.max_worlds` worlds and drives their per-frame dispatch.

pub mod pipeline;
pub mod server;
pub mod world;

pub use pipeline::{Pipeline, ProcessorFn};
pub use server::{EcdbConfig, Server};
pub use world::World;
