//! Table signatures: ordered bitsets over attribute ids that identify an archetype.

use crate::attribute::AttributeId;
use crate::bitset::Bitset;

/// Identifies an archetype. Order-independent: signatures built by setting the same
/// bits in different order compare equal and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    bits: Bitset,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(ids: impl IntoIterator<Item = AttributeId>) -> Self {
        let mut sig = Signature::new();
        for id in ids {
            sig.set(id);
        }
        sig
    }

    pub fn set(&mut self, id: AttributeId) {
        self.bits.set(id.0 as usize);
    }

    pub fn clear(&mut self, id: AttributeId) {
        self.bits.clear(id.0 as usize);
    }

    pub fn is_set(&self, id: AttributeId) -> bool {
        self.bits.is_set(id.0 as usize)
    }

    /// True iff every bit in `of` is also set in `self`.
    pub fn is_superset(&self, of: &Signature) -> bool {
        self.bits.is_superset(&of.bits)
    }

    /// Synonym for `is_superset`, matching the filter matcher's naming.
    pub fn check_bits(&self, mask: &Signature) -> bool {
        self.is_superset(mask)
    }

    pub fn has_any(&self, other: &Signature) -> bool {
        self.bits.has_any(&other.bits)
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AttributeId> + '_ {
        self.bits.iter_set().map(|i| AttributeId(i as u32))
    }

    pub fn union(&self, other: &Signature) -> Signature {
        let mut out = self.clone();
        for id in other.iter() {
            out.set(id);
        }
        out
    }

    pub fn difference(&self, other: &Signature) -> Signature {
        let mut out = self.clone();
        for id in other.iter() {
            out.clear(id);
        }
        out
    }
}
