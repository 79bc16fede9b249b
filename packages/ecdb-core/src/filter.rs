//! Compiled filters: inclusive/exclusive signatures plus a column projection.

use crate::attribute::AttributeId;
use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// A compiled, immutable query: which archetypes match, and which columns (with
/// what access mode) a processor wants projected out of them.
///
/// Filters are reference-counted via `Arc` rather than an explicit
/// create/destroy-handle pair: Rust's ownership model already gives safe shared
/// immutability and automatic release, so `compile_filter` returns an `Arc<Filter>`
/// and dropping the last clone is the "destroy_filter" of the source design.
#[derive(Debug, Clone)]
pub struct Filter {
    inclusive: Signature,
    exclusive: Signature,
    projected: Vec<(AttributeId, AccessMode)>,
}

impl Filter {
    pub fn compile(inclusive: &[(AttributeId, AccessMode)], exclusive: &[AttributeId]) -> Filter {
        let inclusive_sig = Signature::of(inclusive.iter().map(|(id, _)| *id));
        let exclusive_sig = Signature::of(exclusive.iter().copied());
        Filter {
            inclusive: inclusive_sig,
            exclusive: exclusive_sig,
            projected: inclusive.to_vec(),
        }
    }

    pub fn inclusive(&self) -> &Signature {
        &self.inclusive
    }

    pub fn exclusive(&self) -> &Signature {
        &self.exclusive
    }

    pub fn projected(&self) -> &[(AttributeId, AccessMode)] {
        &self.projected
    }

    pub fn matches(&self, signature: &Signature) -> bool {
        signature.check_bits(&self.inclusive) && !signature.has_any(&self.exclusive)
    }

    /// Two filters write-conflict if they touch the same component and at least
    /// one of them writes it. Drives async-batch scheduling in the frame pipeline.
    pub fn write_conflicts_with(&self, other: &Filter) -> bool {
        for &(id, mode) in &self.projected {
            for &(other_id, other_mode) in &other.projected {
                if id == other_id && (mode == AccessMode::Write || other_mode == AccessMode::Write)
                {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> AttributeId {
        AttributeId(n)
    }

    #[test]
    fn matches_inclusive_and_excludes() {
        let f = Filter::compile(&[(id(1), AccessMode::Read)], &[id(2)]);
        assert!(f.matches(&Signature::of([id(1)])));
        assert!(!f.matches(&Signature::of([id(1), id(2)])));
        assert!(!f.matches(&Signature::of([id(3)])));
    }

    #[test]
    fn write_conflict_detection() {
        let write_a = Filter::compile(&[(id(1), AccessMode::Write)], &[]);
        let read_a = Filter::compile(&[(id(1), AccessMode::Read)], &[]);
        let write_b = Filter::compile(&[(id(2), AccessMode::Write)], &[]);
        assert!(write_a.write_conflicts_with(&read_a));
        assert!(!write_a.write_conflicts_with(&write_b));
    }

    #[test]
    fn filter_determinism_for_set_equal_signatures() {
        let a = Filter::compile(&[(id(1), AccessMode::Read), (id(2), AccessMode::Read)], &[]);
        let b = Filter::compile(&[(id(2), AccessMode::Read), (id(1), AccessMode::Read)], &[]);
        let sig = Signature::of([id(1), id(2)]);
        assert_eq!(a.matches(&sig), b.matches(&sig));
    }
}
