//! Stealth manager: holds a resolved config and passes through opaque
//! launch args / init scripts (spec.md §4.J). The evasion payloads
//! themselves are supplied by the caller — this crate carries no
//! fingerprinting or detection-evasion logic, only the plumbing and the
//! human-like delay generator.

use rand::rngs::ThreadRng;

use crate::delay::DelayConfig;
use crate::preset::StealthPreset;

#[derive(Debug, Clone)]
pub struct StealthManager {
    preset: StealthPreset,
    enabled: bool,
    launch_args: Vec<String>,
    init_scripts: Vec<String>,
    delay: DelayConfig,
}

impl StealthManager {
    /// Builds a manager for `preset` with empty launch args/init
    /// scripts; attach the collaborator-supplied payloads with
    /// [`with_launch_args`](Self::with_launch_args) and
    /// [`with_init_scripts`](Self::with_init_scripts).
    pub fn new(preset: StealthPreset) -> Self {
        let delay = match preset {
            StealthPreset::Off => DelayConfig::off(),
            StealthPreset::Balanced => DelayConfig::balanced(),
            StealthPreset::Aggressive => DelayConfig::aggressive(),
        };
        Self {
            preset,
            enabled: preset != StealthPreset::Off,
            launch_args: Vec::new(),
            init_scripts: Vec::new(),
            delay,
        }
    }

    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    pub fn with_init_scripts(mut self, scripts: Vec<String>) -> Self {
        self.init_scripts = scripts;
        self
    }

    pub fn with_delay_config(mut self, delay: DelayConfig) -> Self {
        self.delay = delay;
        self
    }

    pub fn preset(&self) -> StealthPreset {
        self.preset
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Opaque launch arguments, or an empty slice when disabled.
    pub fn launch_args(&self) -> &[String] {
        if self.enabled {
            &self.launch_args
        } else {
            &[]
        }
    }

    /// Opaque init scripts to inject before navigation, or an empty
    /// slice when disabled.
    pub fn init_scripts(&self) -> &[String] {
        if self.enabled {
            &self.init_scripts
        } else {
            &[]
        }
    }

    pub fn human_delay(&self) -> std::time::Duration {
        self.human_delay_with_rng(&mut rand::thread_rng())
    }

    pub fn human_delay_with_rng<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> std::time::Duration {
        if !self.enabled {
            return std::time::Duration::from_millis(0);
        }
        self.delay.sample(rng)
    }
}

impl Default for StealthManager {
    fn default() -> Self {
        Self::new(StealthPreset::default())
    }
}

/// Convenience alias so callers don't need to name `ThreadRng` directly
/// when they want the default, non-deterministic delay source.
pub type DefaultRng = ThreadRng;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_preset_disables_payloads_and_delay() {
        let manager = StealthManager::new(StealthPreset::Off)
            .with_launch_args(vec!["--disable-blink-features=AutomationControlled".into()])
            .with_init_scripts(vec!["window.chrome = {};".into()]);
        assert!(!manager.is_enabled());
        assert!(manager.launch_args().is_empty());
        assert!(manager.init_scripts().is_empty());
        assert_eq!(manager.human_delay(), std::time::Duration::from_millis(0));
    }

    #[test]
    fn balanced_preset_passes_through_opaque_payloads() {
        let args = vec!["--no-sandbox".to_string()];
        let scripts = vec!["Object.defineProperty(navigator, 'webdriver', {get: () => undefined});".to_string()];
        let manager = StealthManager::new(StealthPreset::Balanced)
            .with_launch_args(args.clone())
            .with_init_scripts(scripts.clone());
        assert!(manager.is_enabled());
        assert_eq!(manager.launch_args(), args.as_slice());
        assert_eq!(manager.init_scripts(), scripts.as_slice());
    }

    #[test]
    fn aggressive_preset_widens_delay_range() {
        let balanced = StealthManager::new(StealthPreset::Balanced);
        let aggressive = StealthManager::new(StealthPreset::Aggressive);
        assert!(aggressive.delay.max_delay_ms > balanced.delay.max_delay_ms);
    }
}
