//! Generation-versioned entity handle allocator.

use std::collections::VecDeque;

pub type WorldTag = u8;

const INDEX_BITS: u32 = 22;
const GENERATION_BITS: u32 = 10;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u16 = ((1u32 << GENERATION_BITS) - 1) as u16;

/// A 32-bit entity handle: a 22-bit index and a 10-bit generation. The owning
/// world's tag travels alongside, never packed into the handle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u16,
}

impl Entity {
    pub const INVALID: Entity = Entity {
        index: INDEX_MASK,
        generation: GENERATION_MASK,
    };

    pub fn invalid() -> Self {
        Self::INVALID
    }

    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u16 {
        self.generation
    }

    /// Packs `(index << 10) | generation` into 32 bits, per the wire-form contract.
    pub fn to_bits(self) -> u32 {
        (self.index << GENERATION_BITS) | self.generation as u32
    }

    pub fn from_bits(bits: u32) -> Self {
        Entity {
            index: bits >> GENERATION_BITS,
            generation: (bits & GENERATION_MASK as u32) as u16,
        }
    }
}

/// A 64-bit extension carrying a [`WorldTag`] in the upper 32 bits, for crossing
/// world boundaries (e.g. scripting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalEntity {
    pub world: WorldTag,
    pub entity: Entity,
}

impl GlobalEntity {
    pub fn to_bits(self) -> u64 {
        ((self.world as u64) << 32) | self.entity.to_bits() as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        GlobalEntity {
            world: (bits >> 32) as u8,
            entity: Entity::from_bits(bits as u32),
        }
    }
}

/// Generation-versioned index allocator.
///
/// Deallocated indices are not reused immediately: with only 10 generation bits,
/// immediate recycling would make stale-handle (ABA) bugs statistically likely, so
/// indices sit in a FIFO queue and are only handed back out once the queue holds at
/// least `low_water_mark` entries. This amortizes reuse across many allocations,
/// giving the generation counter room to discriminate.
#[derive(Debug, Clone)]
pub struct IdPool {
    generations: Vec<u16>,
    free_queue: VecDeque<u32>,
    low_water_mark: usize,
}

impl IdPool {
    pub fn new(low_water_mark: usize) -> Self {
        Self {
            generations: Vec::new(),
            free_queue: VecDeque::new(),
            low_water_mark,
        }
    }

    /// Allocates an entity handle. Returns `(entity, reused)`, where `reused`
    /// indicates whether the index came from the recycle queue.
    pub fn allocate(&mut self) -> (Entity, bool) {
        if self.free_queue.len() >= self.low_water_mark {
            // Safe: length was just checked to be non-zero via the >= comparison
            // above (low_water_mark is always > 0 in practice, but guard anyway).
            if let Some(index) = self.free_queue.pop_front() {
                let generation = self.generations[index as usize];
                return (Entity { index, generation }, true);
            }
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        (
            Entity {
                index,
                generation: 0,
            },
            false,
        )
    }

    /// Releases `entity`'s index back to the pool. Bumps the generation so existing
    /// handles referring to the old instance become stale. Generation overflow wraps
    /// and is logged, not fatal.
    pub fn deallocate(&mut self, entity: Entity) {
        debug_assert!(self.is_valid(entity), "deallocate of a stale entity handle");
        if !self.is_valid(entity) {
            return;
        }
        let index = entity.index as usize;
        let next = self.generations[index].wrapping_add(1) & GENERATION_MASK;
        if next == 0 {
            tracing::warn!(index, "entity generation counter wrapped to zero");
        }
        self.generations[index] = next;
        self.free_queue.push_back(entity.index);
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        (entity.index as usize) < self.generations.len()
            && self.generations[entity.index as usize] == entity.generation
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn free_queue_len(&self) -> usize {
        self.free_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_roundtrip() {
        let e = Entity {
            index: 12345,
            generation: 7,
        };
        assert_eq!(Entity::from_bits(e.to_bits()), e);
    }

    #[test]
    fn fresh_allocation_not_reused() {
        let mut pool = IdPool::new(4);
        let (e0, reused) = pool.allocate();
        assert!(!reused);
        assert_eq!(e0.index(), 0);
        assert!(pool.is_valid(e0));
    }

    #[test]
    fn recycling_respects_low_water_mark() {
        let mut pool = IdPool::new(4);
        let entities: Vec<_> = (0..4).map(|_| pool.allocate().0).collect();
        for e in &entities {
            pool.deallocate(*e);
        }
        // Queue is now exactly at the low water mark; next allocate should reuse.
        let (reused_entity, reused) = pool.allocate();
        assert!(reused);
        assert_eq!(reused_entity.index(), entities[0].index());
        assert_ne!(reused_entity.generation(), entities[0].generation());
        assert!(!pool.is_valid(entities[0]));
    }

    #[test]
    fn below_low_water_mark_allocates_fresh() {
        let mut pool = IdPool::new(1024);
        let e0 = pool.allocate().0;
        pool.deallocate(e0);
        let (e1, reused) = pool.allocate();
        assert!(!reused);
        assert_ne!(e1.index(), e0.index());
    }

    #[test]
    fn deallocate_then_validity_check() {
        let mut pool = IdPool::new(1);
        let e0 = pool.allocate().0;
        assert!(pool.is_valid(e0));
        pool.deallocate(e0);
        assert!(!pool.is_valid(e0));
    }

    #[test]
    fn global_entity_wire_form() {
        let g = GlobalEntity {
            world: 3,
            entity: Entity {
                index: 99,
                generation: 1,
            },
        };
        assert_eq!(GlobalEntity::from_bits(g.to_bits()), g);
    }
}
