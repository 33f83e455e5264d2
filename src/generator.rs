//! Per-frame instance transform generation.
//!
//! Every output slot is a pure function of the point it is anchored to, the
//! configuration snapshot, the playback time and the seed. Slots are filled in
//! `BATCH_WIDTH`-wide chunks on the rayon pool; no slot reads another.

use glam::Vec3;
use rayon::prelude::*;

use crate::config::CloneConfig;
use crate::instance::{InstanceBatch, InstanceTransform, BATCH_WIDTH};
use crate::noise::{gradient_noise_3d, pulse_sample};
use crate::point_cloud::{tangent_for, PointSource};

/// The point data one instance is anchored to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
}

/// Source point for an instance slot. Padding slots past the last point wrap
/// around to the start of the cloud.
pub fn source_index(instance: u32, point_count: u32) -> u32 {
    instance % point_count
}

/// Ambient noise value in `[-1, 1]` at a point.
pub fn ambient_noise(position: Vec3, config: &CloneConfig, time: f32, seed: i32) -> f32 {
    let coord = position * config.noise_frequency()
        + Vec3::splat(seed as f32)
        + config.noise_motion() * time;
    gradient_noise_3d(coord)
}

/// Whether `instance` is pulsing at `time`.
pub fn is_pulsing(instance: u32, config: &CloneConfig, time: f32, seed: i32) -> bool {
    let pulse_time = config.pulse_frequency() * (time + seed as f32);
    pulse_sample(instance, pulse_time) < config.pulse_probability()
}

/// Final uniform scale for one instance. Never negative.
pub fn instance_scale(ambient: f32, pulsing: bool, config: &CloneConfig) -> f32 {
    let pulse = if pulsing { config.scale_by_pulse() } else { 0.0 };
    (config.base_scale() + config.scale_by_noise() * ambient + pulse).max(0.0)
}

/// Orthonormal `(right, up, forward)` frame for a point.
///
/// `up` blends from world Y (modifier 0) to the point normal (modifier 1).
/// `forward` is the tangent projected onto the plane perpendicular to `up`.
pub fn orient(normal: Vec3, tangent: Vec3, normal_modifier: f32) -> (Vec3, Vec3, Vec3) {
    let normal = normal.try_normalize().unwrap_or(Vec3::Y);
    let up = Vec3::Y
        .lerp(normal, normal_modifier)
        .try_normalize()
        .unwrap_or(Vec3::Y);

    let forward = (tangent - up * tangent.dot(up))
        .try_normalize()
        .unwrap_or_else(|| tangent_for(up));
    let right = up.cross(forward);

    (right, up, forward)
}

/// Compute the transform of a single instance.
pub fn evaluate_instance(
    instance: u32,
    point: &SamplePoint,
    config: &CloneConfig,
    time: f32,
    seed: i32,
) -> InstanceTransform {
    let ambient = ambient_noise(point.position, config, time, seed);
    let pulsing = is_pulsing(instance, config, time, seed);
    let scale = instance_scale(ambient, pulsing, config);

    let (right, up, forward) = orient(point.normal, point.tangent, config.normal_modifier());

    InstanceTransform::from_axes(right * scale, up * scale, forward * scale, point.position)
}

/// Fill `out` with one transform per slot.
///
/// `out.len()` is the instance count and is expected to be a multiple of
/// `BATCH_WIDTH`. With an empty point source every slot is zeroed.
pub fn generate(
    points: &dyn PointSource,
    config: CloneConfig,
    time: f32,
    seed: i32,
    out: &mut [InstanceTransform],
) {
    let point_count = points.point_count();
    if point_count == 0 {
        out.fill(InstanceTransform::default());
        return;
    }

    let positions = points.positions();
    let normals = points.normals();
    let tangents = points.tangents();
    let width = BATCH_WIDTH as usize;

    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(group, slots)| {
            for (lane, slot) in slots.iter_mut().enumerate() {
                let instance = (group * width + lane) as u32;
                let src = source_index(instance, point_count) as usize;
                let point = SamplePoint {
                    position: positions[src],
                    normal: normals[src],
                    tangent: tangents[src],
                };
                *slot = evaluate_instance(instance, &point, &config, time, seed);
            }
        });
}

/// Allocate a correctly sized buffer and generate into it.
pub fn generate_vec(
    points: &dyn PointSource,
    config: CloneConfig,
    time: f32,
    seed: i32,
) -> Vec<InstanceTransform> {
    let batch = InstanceBatch::for_point_count(points.point_count());
    let mut out = vec![InstanceTransform::default(); batch.instance_count() as usize];
    generate(points, config, time, seed, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud::PointCloud;

    fn test_cloud() -> PointCloud {
        PointCloud::sphere(8, 12, 1.5)
    }

    #[test]
    fn test_generate_is_deterministic() {
        let cloud = test_cloud();
        let mut config = CloneConfig::default();
        config.set_pulse_probability(0.1);

        let a = generate_vec(&cloud, config, 3.25, 17);
        let b = generate_vec(&cloud, config, 3.25, 17);

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(bytemuck::bytes_of(x), bytemuck::bytes_of(y));
        }
    }

    #[test]
    fn test_output_sized_to_batches() {
        let cloud = test_cloud();
        let out = generate_vec(&cloud, CloneConfig::default(), 0.0, 0);
        assert_eq!(out.len() % BATCH_WIDTH as usize, 0);
        assert!(out.len() >= cloud.len());
    }

    #[test]
    fn test_padding_wraps_to_start() {
        let cloud = test_cloud();
        let n = cloud.len();
        let out = generate_vec(&cloud, CloneConfig::default(), 1.0, 3);
        assert!(out.len() > n, "test cloud should need padding");

        for i in n..out.len() {
            assert_eq!(out[i].translation(), cloud.positions()[i % n]);
        }
    }

    #[test]
    fn test_translation_is_point_position() {
        let cloud = test_cloud();
        let out = generate_vec(&cloud, CloneConfig::default(), 2.0, 5);
        for (i, p) in cloud.positions().iter().enumerate() {
            assert_eq!(out[i].translation(), *p);
        }
    }

    #[test]
    fn test_scale_never_negative() {
        let cloud = test_cloud();
        for &base in &[-1.0, 0.0, 0.5] {
            for &by_noise in &[-2.0, 0.0, 2.0] {
                for &by_pulse in &[-1.0, 0.0, 1.0] {
                    let mut config = CloneConfig::default();
                    config.set_base_scale(base);
                    config.set_scale_by_noise(by_noise);
                    config.set_scale_by_pulse(by_pulse);
                    config.set_pulse_probability(0.1);

                    for t in [0.0, 0.7, 13.3] {
                        for transform in generate_vec(&cloud, config, t, 9) {
                            for axis in 0..3 {
                                let v = transform.axis(axis);
                                assert!(v.is_finite());
                            }
                            assert!(transform.scale() >= 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_instance_scale_clamps_at_zero() {
        let mut config = CloneConfig::default();
        config.set_base_scale(0.1);
        config.set_scale_by_noise(1.0);
        config.set_scale_by_pulse(-5.0);
        assert_eq!(instance_scale(-1.0, true, &config), 0.0);
        assert!((instance_scale(0.5, false, &config) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_basis_is_orthonormal() {
        for (normal, tangent, modifier) in [
            (Vec3::X, Vec3::Z, 1.0),
            (Vec3::new(0.3, 0.8, -0.5), Vec3::X, 0.5),
            (Vec3::Y, Vec3::Y, 1.0), // tangent parallel to up
            (-Vec3::Y, Vec3::X, 0.5), // blend cancels out
        ] {
            let (right, up, forward) = orient(normal, tangent, modifier);
            for v in [right, up, forward] {
                assert!((v.length() - 1.0).abs() < 1e-4);
            }
            assert!(right.dot(up).abs() < 1e-4);
            assert!(up.dot(forward).abs() < 1e-4);
            assert!(right.dot(forward).abs() < 1e-4);
        }
    }

    #[test]
    fn test_normal_modifier_extremes() {
        let normal = Vec3::X;
        let (_, up, _) = orient(normal, Vec3::Z, 0.0);
        assert!((up - Vec3::Y).length() < 1e-5);

        let (_, up, _) = orient(normal, Vec3::Z, 1.0);
        assert!((up - normal).length() < 1e-5);
    }

    #[test]
    fn test_pulse_rate_matches_probability() {
        let mut config = CloneConfig::default();
        config.set_pulse_probability(0.05);
        config.set_pulse_frequency(1.0);

        let instances = 4096u32;
        let steps = 50;
        let mut pulsing = 0u32;
        for step in 0..steps {
            let t = step as f32 + 0.5;
            pulsing += (0..instances)
                .filter(|&i| is_pulsing(i, &config, t, 11))
                .count() as u32;
        }

        let rate = pulsing as f32 / (instances * steps) as f32;
        assert!((rate - 0.05).abs() < 0.005, "pulse rate was {}", rate);
    }

    #[test]
    fn test_zero_probability_never_pulses() {
        let mut config = CloneConfig::default();
        config.set_pulse_probability(0.0);
        assert!((0..10_000).all(|i| !is_pulsing(i, &config, i as f32 * 0.37, 0)));
    }

    #[test]
    fn test_scale_continuous_in_time_without_pulses() {
        let cloud = test_cloud();
        let mut config = CloneConfig::default();
        config.set_pulse_probability(0.0);

        let a = generate_vec(&cloud, config, 4.0, 1);
        let b = generate_vec(&cloud, config, 4.001, 1);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.scale() - y.scale()).abs() < 1e-3);
        }
    }

    #[test]
    fn test_seed_changes_output() {
        let cloud = test_cloud();
        let a = generate_vec(&cloud, CloneConfig::default(), 1.3, 1);
        let b = generate_vec(&cloud, CloneConfig::default(), 1.3, 2);
        assert!(a.iter().zip(b.iter()).any(|(x, y)| x != y));
    }

    #[test]
    fn test_empty_source_zeroes_output() {
        let cloud = PointCloud::default();
        let filled = InstanceTransform::from_axes(Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE);
        let mut out = vec![filled; 64];
        generate(&cloud, CloneConfig::default(), 0.0, 0, &mut out);
        assert!(out.iter().all(|t| *t == InstanceTransform::default()));
    }

    #[test]
    fn test_ambient_noise_samples_scrolled_field() {
        let mut config = CloneConfig::default();
        config.set_noise_frequency(1.7);
        config.set_noise_motion(Vec3::new(0.3, -0.2, 0.5));
        let position = Vec3::new(0.4, -1.2, 2.5);

        for (time, seed) in [(0.0, 0), (1.25, 0), (3.5, 7), (10.0, -4)] {
            let coord = position * 1.7
                + Vec3::splat(seed as f32)
                + Vec3::new(0.3, -0.2, 0.5) * time;
            assert_eq!(
                ambient_noise(position, &config, time, seed),
                gradient_noise_3d(coord),
                "time={} seed={}",
                time,
                seed
            );
        }
    }

    #[test]
    fn test_pulse_clock_includes_seed() {
        let mut config = CloneConfig::default();
        config.set_pulse_frequency(3.0);
        config.set_pulse_probability(0.1);

        for (time, seed) in [(0.2, 0), (1.7, 5), (4.0, -3)] {
            for instance in 0..256 {
                let pulse_time = 3.0 * (time + seed as f32);
                assert_eq!(
                    is_pulsing(instance, &config, time, seed),
                    pulse_sample(instance, pulse_time) < 0.1,
                    "instance={} time={} seed={}",
                    instance,
                    time,
                    seed
                );
            }
        }
    }

    #[test]
    fn test_pulsing_instances_grow_by_pulse_scale() {
        let mut config = CloneConfig::default();
        config.set_base_scale(0.2);
        config.set_scale_by_noise(0.0);
        config.set_scale_by_pulse(0.5);
        config.set_pulse_probability(0.1);

        let point = SamplePoint {
            position: Vec3::new(1.0, 2.0, 3.0),
            normal: Vec3::Y,
            tangent: Vec3::X,
        };
        let (time, seed) = (2.3, 1);

        let mut pulsed = 0;
        for instance in 0..512 {
            let transform = evaluate_instance(instance, &point, &config, time, seed);
            let expected = if is_pulsing(instance, &config, time, seed) {
                pulsed += 1;
                0.7
            } else {
                0.2
            };
            assert!(
                (transform.scale() - expected).abs() < 1e-6,
                "instance {} scale {}",
                instance,
                transform.scale()
            );
        }
        assert!(pulsed > 0 && pulsed < 512);
    }
}
