//! Named entity templates: a blueprint is an ordered list of component-default
//! overrides, instantiated by `World::create_entity_from_template` at the runtime
//! layer (which alone can run init hooks against a live world).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::attribute::AttributeId;

#[derive(Debug, Clone)]
pub struct Blueprint {
    pub name: String,
    /// Components the instantiated entity starts with, in registration order, each
    /// with its overriding default bytes (a component not listed here still gets its
    /// registry default, if the component has one).
    pub overrides: Vec<(AttributeId, Vec<u8>)>,
}

impl Blueprint {
    pub fn components(&self) -> Vec<AttributeId> {
        self.overrides.iter().map(|(id, _)| *id).collect()
    }

    pub fn override_of(&self, id: AttributeId) -> Option<&[u8]> {
        self.overrides.iter().find(|(c, _)| *c == id).map(|(_, b)| b.as_slice())
    }
}

/// Process-wide, append-only registry of named templates. Mirrors the attribute
/// registry's idempotent-by-name registration discipline.
#[derive(Default)]
pub struct BlueprintRegistry {
    by_name: RwLock<HashMap<String, Blueprint>>,
}

impl BlueprintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a blueprint. Unlike attribute registration this is not
    /// idempotent-on-conflict: re-registering a name overwrites it, since blueprints
    /// are game data, not identity-bearing type records.
    pub fn register_blueprint(&self, name: &str, overrides: Vec<(AttributeId, Vec<u8>)>) {
        self.by_name.write().unwrap().insert(
            name.to_string(),
            Blueprint {
                name: name.to_string(),
                overrides,
            },
        );
    }

    pub fn lookup_blueprint(&self, name: &str) -> Option<Blueprint> {
        self.by_name.read().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_name.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_roundtrips() {
        let reg = BlueprintRegistry::new();
        let position = AttributeId(1);
        reg.register_blueprint("tree", vec![(position, vec![1, 2, 3, 4])]);
        let bp = reg.lookup_blueprint("tree").unwrap();
        assert_eq!(bp.override_of(position), Some(&[1, 2, 3, 4][..]));
    }

    #[test]
    fn missing_blueprint_is_none() {
        let reg = BlueprintRegistry::new();
        assert!(reg.lookup_blueprint("missing").is_none());
    }

    #[test]
    fn re_registering_overwrites() {
        let reg = BlueprintRegistry::new();
        let hp = AttributeId(2);
        reg.register_blueprint("goblin", vec![(hp, vec![10])]);
        reg.register_blueprint("goblin", vec![(hp, vec![20])]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup_blueprint("goblin").unwrap().override_of(hp), Some(&[20][..]));
    }
}
