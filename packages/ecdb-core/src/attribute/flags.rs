//! Per-attribute flag bits.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttributeFlags: u32 {
        /// On row destruction, the last value is migrated into the owning world's
        /// decay buffer instead of being silently dropped.
        const DECAY = 1 << 0;
        /// Present in the level file's `string_atom` patching pass.
        const STRING_ATOM = 1 << 1;
        /// Present in the level file's `entity_id` patching pass.
        const ENTITY_ID = 1 << 2;
    }
}
