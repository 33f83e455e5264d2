//! Clone field configuration.
//!
//! All values are clamped when set, never rejected. Configurations read from
//! disk go through [`CloneConfig::sanitized`] so the generator only ever sees
//! values inside their documented ranges.

use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Upper bound for the per-step pulse probability.
pub const MAX_PULSE_PROBABILITY: f32 = 0.1;

fn default_noise_frequency() -> f32 {
    1.0
}

fn default_noise_motion() -> Vec3 {
    Vec3::new(0.0, 0.5, 0.0)
}

fn default_normal_modifier() -> f32 {
    1.0
}

fn default_pulse_probability() -> f32 {
    0.01
}

fn default_pulse_frequency() -> f32 {
    2.0
}

fn default_base_scale() -> f32 {
    0.05
}

fn default_scale_by_noise() -> f32 {
    0.05
}

fn default_scale_by_pulse() -> f32 {
    0.1
}

/// Axis-aligned bounds handed to the draw call for culling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub center: Vec3,
    pub size: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            size: Vec3::splat(10.0),
        }
    }
}

impl Bounds {
    /// Create bounds, clamping negative size components to zero.
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center,
            size: size.max(Vec3::ZERO),
        }
    }

    pub fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    pub fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }
}

/// Noise, pulse, scale and bounds parameters for a clone field.
///
/// Fields are only written through the setters, which clamp. The type is
/// `Copy`: the frame driver hands the generator a snapshot, so a frame in
/// flight can never observe a half-applied edit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneConfig {
    /// Spatial frequency of the ambient noise field (>= 0).
    #[serde(default = "default_noise_frequency")]
    noise_frequency: f32,

    /// Velocity at which the ambient field scrolls through noise space.
    #[serde(default = "default_noise_motion")]
    noise_motion: Vec3,

    /// How far the clone's up axis follows the point normal (0..=1).
    #[serde(default = "default_normal_modifier")]
    normal_modifier: f32,

    /// Chance that an instance pulses during one pulse step (0..=0.1).
    #[serde(default = "default_pulse_probability")]
    pulse_probability: f32,

    /// Pulse steps per second (>= 0).
    #[serde(default = "default_pulse_frequency")]
    pulse_frequency: f32,

    /// Scale every instance starts from.
    #[serde(default = "default_base_scale")]
    base_scale: f32,

    /// Scale added per unit of ambient noise.
    #[serde(default = "default_scale_by_noise")]
    scale_by_noise: f32,

    /// Scale added while an instance pulses.
    #[serde(default = "default_scale_by_pulse")]
    scale_by_pulse: f32,

    /// Culling bounds passed through to the draw call.
    #[serde(default)]
    bounds: Bounds,

    /// Random seed. Offsets both the noise field and the pulse clock.
    #[serde(default)]
    seed: i32,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            noise_frequency: default_noise_frequency(),
            noise_motion: default_noise_motion(),
            normal_modifier: default_normal_modifier(),
            pulse_probability: default_pulse_probability(),
            pulse_frequency: default_pulse_frequency(),
            base_scale: default_base_scale(),
            scale_by_noise: default_scale_by_noise(),
            scale_by_pulse: default_scale_by_pulse(),
            bounds: Bounds::default(),
            seed: 0,
        }
    }
}

/// Clamp `value` into `[min, max]`, treating NaN as `min` and logging when the
/// value had to change.
fn clamp_logged(name: &str, value: f32, min: f32, max: f32) -> f32 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        log::warn!("{} = {} out of range, clamped to {}", name, value, clamped);
    }
    clamped
}

impl CloneConfig {
    /// Load a configuration from a JSON file and clamp it into range.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: CloneConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config.sanitized())
    }

    /// Return a copy with every field clamped into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.set_noise_frequency(self.noise_frequency);
        self.set_normal_modifier(self.normal_modifier);
        self.set_pulse_probability(self.pulse_probability);
        self.set_pulse_frequency(self.pulse_frequency);
        self.set_bounds(self.bounds);
        self
    }

    pub fn noise_frequency(&self) -> f32 {
        self.noise_frequency
    }

    pub fn noise_motion(&self) -> Vec3 {
        self.noise_motion
    }

    pub fn normal_modifier(&self) -> f32 {
        self.normal_modifier
    }

    pub fn pulse_probability(&self) -> f32 {
        self.pulse_probability
    }

    pub fn pulse_frequency(&self) -> f32 {
        self.pulse_frequency
    }

    pub fn base_scale(&self) -> f32 {
        self.base_scale
    }

    pub fn scale_by_noise(&self) -> f32 {
        self.scale_by_noise
    }

    pub fn scale_by_pulse(&self) -> f32 {
        self.scale_by_pulse
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    pub fn set_noise_frequency(&mut self, value: f32) {
        self.noise_frequency = clamp_logged("noiseFrequency", value, 0.0, f32::MAX);
    }

    pub fn set_noise_motion(&mut self, value: Vec3) {
        self.noise_motion = value;
    }

    pub fn set_normal_modifier(&mut self, value: f32) {
        self.normal_modifier = clamp_logged("normalModifier", value, 0.0, 1.0);
    }

    pub fn set_pulse_probability(&mut self, value: f32) {
        self.pulse_probability =
            clamp_logged("pulseProbability", value, 0.0, MAX_PULSE_PROBABILITY);
    }

    pub fn set_pulse_frequency(&mut self, value: f32) {
        self.pulse_frequency = clamp_logged("pulseFrequency", value, 0.0, f32::MAX);
    }

    pub fn set_base_scale(&mut self, value: f32) {
        self.base_scale = value;
    }

    pub fn set_scale_by_noise(&mut self, value: f32) {
        self.scale_by_noise = value;
    }

    pub fn set_scale_by_pulse(&mut self, value: f32) {
        self.scale_by_pulse = value;
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        let size = Vec3::new(
            clamp_logged("bounds.size.x", bounds.size.x, 0.0, f32::MAX),
            clamp_logged("bounds.size.y", bounds.size.y, 0.0, f32::MAX),
            clamp_logged("bounds.size.z", bounds.size.z, 0.0, f32::MAX),
        );
        self.bounds = Bounds {
            center: bounds.center,
            size,
        };
    }

    pub fn set_seed(&mut self, seed: i32) {
        self.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let mut config = CloneConfig::default();

        config.set_noise_frequency(-3.0);
        assert_eq!(config.noise_frequency, 0.0);

        config.set_normal_modifier(1.5);
        assert_eq!(config.normal_modifier, 1.0);
        config.set_normal_modifier(-0.5);
        assert_eq!(config.normal_modifier, 0.0);

        config.set_pulse_probability(0.5);
        assert_eq!(config.pulse_probability, MAX_PULSE_PROBABILITY);

        config.set_pulse_frequency(f32::NAN);
        assert_eq!(config.pulse_frequency, 0.0);

        config.set_bounds(Bounds::new(Vec3::ONE, Vec3::new(-1.0, 2.0, 3.0)));
        assert_eq!(config.bounds.size, Vec3::new(0.0, 2.0, 3.0));
    }

    #[test]
    fn test_in_range_values_untouched() {
        let mut config = CloneConfig::default();
        config.set_pulse_probability(0.05);
        config.set_normal_modifier(0.25);
        assert_eq!(config.pulse_probability, 0.05);
        assert_eq!(config.normal_modifier, 0.25);
    }

    #[test]
    fn test_parse_partial_json_uses_defaults() {
        let json = r#"{ "seed": 42, "pulseProbability": 0.7, "noiseMotion": [1.0, 0.0, 0.0] }"#;
        let config: CloneConfig = serde_json::from_str(json).unwrap();
        let config = config.sanitized();

        assert_eq!(config.seed, 42);
        assert_eq!(config.pulse_probability, MAX_PULSE_PROBABILITY);
        assert_eq!(config.noise_motion, Vec3::X);
        assert_eq!(config.noise_frequency, default_noise_frequency());
        assert_eq!(config.bounds, Bounds::default());
    }

    #[test]
    fn test_bounds_extents() {
        let bounds = Bounds::new(Vec3::new(1.0, 0.0, 0.0), Vec3::splat(2.0));
        assert_eq!(bounds.min(), Vec3::new(0.0, -1.0, -1.0));
        assert_eq!(bounds.max(), Vec3::new(2.0, 1.0, 1.0));
    }
}
