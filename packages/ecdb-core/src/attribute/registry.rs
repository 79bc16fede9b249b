//! Global registry of component kinds.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::flags::AttributeFlags;
use crate::id_pool::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(pub u32);

/// A component init hook: `fn(world, entity, value)`, invoked once per
/// (entity, component) absent-to-present transition, on the freshly written bytes.
///
/// The registry is a leaf module with no dependency on the runtime's `World` type, so
/// the hook is expressed over `&mut dyn Any`; the one caller able to invoke it (the
/// runtime's `World`) downcasts back to itself. This is the "small tagged trait-object
/// keyed by ComponentId" construction, adapted to avoid a core→runtime dependency.
pub type InitHook = Arc<dyn Fn(&mut dyn Any, Entity, *mut u8) + Send + Sync>;

#[derive(Clone)]
pub struct AttributeRegistration {
    pub id: AttributeId,
    pub name: String,
    pub size: usize,
    pub default: Vec<u8>,
    pub flags: AttributeFlags,
    pub init_hook: Option<InitHook>,
}

impl std::fmt::Debug for AttributeRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("flags", &self.flags)
            .field("has_init_hook", &self.init_hook.is_some())
            .finish()
    }
}

/// Process-wide, append-only registry of component kinds.
///
/// Registration happens during static init; all reads thereafter are lock-free in
/// spirit (a `RwLock` read guard, never contended once registration has settled).
#[derive(Default)]
pub struct AttributeRegistry {
    by_id: RwLock<Vec<Arc<AttributeRegistration>>>,
    by_name: RwLock<HashMap<String, AttributeId>>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component kind. Idempotent by name: re-registering an existing
    /// name with the same size returns the existing id.
    pub fn register(
        &self,
        name: &str,
        size: usize,
        default: Vec<u8>,
        flags: AttributeFlags,
        init_hook: Option<InitHook>,
    ) -> AttributeId {
        if let Some(&existing) = self.by_name.read().unwrap().get(name) {
            let reg = &self.by_id.read().unwrap()[existing.0 as usize];
            debug_assert_eq!(
                reg.size, size,
                "attribute '{name}' re-registered with a different size"
            );
            return existing;
        }
        let mut by_id = self.by_id.write().unwrap();
        let id = AttributeId(by_id.len() as u32);
        by_id.push(Arc::new(AttributeRegistration {
            id,
            name: name.to_string(),
            size,
            default,
            flags,
            init_hook,
        }));
        self.by_name.write().unwrap().insert(name.to_string(), id);
        id
    }

    /// Convenience wrapper inferring size and default bytes from `T`, per the
    /// "replace component-registration macros with a generic helper" design note.
    pub fn register_type<T: Copy + Send + Sync + 'static>(
        &self,
        name: &str,
        default: T,
        flags: AttributeFlags,
        init_hook: Option<InitHook>,
    ) -> AttributeId {
        let size = std::mem::size_of::<T>();
        let mut bytes = vec![0u8; size];
        if size > 0 {
            // Safety: `bytes` is exactly `size_of::<T>()` long and `T: Copy`.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &default as *const T as *const u8,
                    bytes.as_mut_ptr(),
                    size,
                );
            }
        }
        self.register(name, size, bytes, flags, init_hook)
    }

    /// Registers a zero-size tag component (a pure marker, no storage, no default
    /// bytes to copy).
    pub fn register_tag(&self, name: &str, flags: AttributeFlags) -> AttributeId {
        self.register(name, 0, Vec::new(), flags, None)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<AttributeId> {
        self.by_name.read().unwrap().get(name).copied()
    }

    fn get(&self, id: AttributeId) -> Arc<AttributeRegistration> {
        self.by_id.read().unwrap()[id.0 as usize].clone()
    }

    pub fn size_of(&self, id: AttributeId) -> usize {
        self.get(id).size
    }

    pub fn default_of(&self, id: AttributeId) -> Vec<u8> {
        self.get(id).default.clone()
    }

    pub fn flags_of(&self, id: AttributeId) -> AttributeFlags {
        self.get(id).flags
    }

    pub fn name_of(&self, id: AttributeId) -> String {
        self.get(id).name.clone()
    }

    pub fn init_hook_of(&self, id: AttributeId) -> Option<InitHook> {
        self.get(id).init_hook.clone()
    }

    pub fn is_decaying(&self, id: AttributeId) -> bool {
        self.flags_of(id).contains(AttributeFlags::DECAY)
    }

    pub fn len(&self) -> usize {
        self.by_id.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
