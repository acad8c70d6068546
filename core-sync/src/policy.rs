//! Per-family sync behaviour.

use core_library::EntityFamily;

/// Knobs that differ between entity families. Everything else about
/// syncing a family is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyPolicy {
    /// A blank-query refresh from offset 0 replaces the family's cache
    /// instead of merging into it.
    pub clear_before_refetch: bool,
    /// Collapse duplicate ids in network payloads before emitting them.
    pub dedupe: bool,
}

impl FamilyPolicy {
    pub const fn merge() -> Self {
        Self {
            clear_before_refetch: false,
            dedupe: true,
        }
    }

    pub const fn replace() -> Self {
        Self {
            clear_before_refetch: true,
            dedupe: true,
        }
    }

    /// Playlists are small and edited elsewhere, so a full listing is
    /// authoritative. The other families are merged page by page.
    pub fn for_family(family: EntityFamily) -> Self {
        match family {
            EntityFamily::Playlist => Self::replace(),
            EntityFamily::Album | EntityFamily::Artist | EntityFamily::Song => Self::merge(),
        }
    }
}

impl Default for FamilyPolicy {
    fn default() -> Self {
        Self::merge()
    }
}
