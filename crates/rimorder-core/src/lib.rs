//! Deterministic load-order resolution for RimWorld-style mod sets.
//!
//! The crate reconciles three constraint sources into one load order: the
//! ordering preferences each mod declares for itself, the community rules
//! database (fetched and cached by [`RuleStore`]), and a hardcoded engine
//! table pinning the shim loader, the base game and its expansions to the
//! front. Resolution is total and deterministic: contradictory constraints
//! degrade to a stable fallback order, they never fail a call.

mod conflict;
mod mods;
mod resolve;
mod store;

pub use conflict::{check_order, Issue, IssueKind, Severity};
pub use mods::{ModRecord, ModSet, ModSource, MODSET_SCHEMA_VERSION};
pub use resolve::{resolve_load_order, FIXED_HEAD};
pub use store::{
    Rule, RuleStore, RulesDb, StoreStats, CACHE_EXPIRY_SECS, DEFAULT_RULES_URL,
};

/// Canonical form of a package id. Every internal map key, set member and
/// graph node uses this form; callers get their original casing back.
pub fn canonical_id(package_id: &str) -> String {
    package_id.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_lowercases() {
        assert_eq!(canonical_id("Ludeon.RimWorld"), "ludeon.rimworld");
        assert_eq!(canonical_id("already.lower"), "already.lower");
    }
}
