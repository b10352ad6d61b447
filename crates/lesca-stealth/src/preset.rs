//! Stealth presets (spec.md §4.J expansion).
//!
//! Grounded on the teacher's `riptide-stealth::config::StealthPreset`
//! (`None`/`Low`/`Medium`/`High`), collapsed to the three levels
//! SPEC_FULL.md calls for since this crate carries no fingerprinting or
//! evasion logic of its own — only the delay-range knobs a preset turns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthPreset {
    /// No delay jitter, no launch args/init scripts applied.
    Off,
    #[default]
    Balanced,
    Aggressive,
}
