//! Deterministic noise primitives.
//!
//! Everything here is computed on the CPU from integer hashes so that a given
//! seed and time always produce the same clone transforms, regardless of thread
//! scheduling or platform.

use glam::Vec3;

/// Salt for the ambient gradient field lattice hash.
const AMBIENT_SALT: u32 = 0x27d4_eb2f;

/// Salt for the per-instance pulse gate. Kept distinct from the ambient salt so
/// the two signals never correlate.
pub const PULSE_SALT: u32 = 0x1656_67b1;

/// The twelve cube-edge directions used as lattice gradients.
const GRADIENTS: [[f32; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

/// Integer hash of a 3D lattice coordinate.
pub fn hash_3d(x: i32, y: i32, z: i32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(x as u32).wrapping_mul(0x9e37_79b9);
    h = h.wrapping_add(y as u32).wrapping_mul(0x85eb_ca6b);
    h = h.wrapping_add(z as u32).wrapping_mul(0xc2b2_ae35);
    finalize(h)
}

/// Integer hash of an (instance, time step) pair.
pub fn hash_2d(a: u32, b: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(a).wrapping_mul(0x9e37_79b9);
    h = h.wrapping_add(b).wrapping_mul(0x85eb_ca6b);
    finalize(h)
}

/// Avalanche step shared by the hashes.
fn finalize(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Map a hash to `[0, 1)`.
///
/// Uses the top 24 bits so the result is exactly representable and never
/// rounds up to 1.0.
pub fn hash_to_unit(h: u32) -> f32 {
    (h >> 8) as f32 / (1u32 << 24) as f32
}

/// Quintic fade curve, C2-continuous at the lattice boundaries.
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Contribution of one lattice corner.
fn corner(cell: [i32; 3], offset: [i32; 3], local: Vec3) -> f32 {
    let h = hash_3d(
        cell[0].wrapping_add(offset[0]),
        cell[1].wrapping_add(offset[1]),
        cell[2].wrapping_add(offset[2]),
        AMBIENT_SALT,
    );
    let g = GRADIENTS[(h % 12) as usize];
    let d = local - Vec3::new(offset[0] as f32, offset[1] as f32, offset[2] as f32);
    g[0] * d.x + g[1] * d.y + g[2] * d.z
}

/// 3D gradient noise.
///
/// Continuous in `p`, zero on integer lattice points, and clamped to `[-1, 1]`.
pub fn gradient_noise_3d(p: Vec3) -> f32 {
    let base = p.floor();
    let cell = [base.x as i32, base.y as i32, base.z as i32];
    let local = p - base;

    let u = fade(local.x);
    let v = fade(local.y);
    let w = fade(local.z);

    let n000 = corner(cell, [0, 0, 0], local);
    let n100 = corner(cell, [1, 0, 0], local);
    let n010 = corner(cell, [0, 1, 0], local);
    let n110 = corner(cell, [1, 1, 0], local);
    let n001 = corner(cell, [0, 0, 1], local);
    let n101 = corner(cell, [1, 0, 1], local);
    let n011 = corner(cell, [0, 1, 1], local);
    let n111 = corner(cell, [1, 1, 1], local);

    let nx00 = lerp(n000, n100, u);
    let nx10 = lerp(n010, n110, u);
    let nx01 = lerp(n001, n101, u);
    let nx11 = lerp(n011, n111, u);

    let nxy0 = lerp(nx00, nx10, v);
    let nxy1 = lerp(nx01, nx11, v);

    lerp(nxy0, nxy1, w).clamp(-1.0, 1.0)
}

/// Uniform value in `[0, 1)` for an instance during a discrete pulse step.
///
/// The step is `floor(pulse_time)`, so the value holds steady between integer
/// pulse times and re-rolls at each boundary.
pub fn pulse_sample(instance: u32, pulse_time: f32) -> f32 {
    let step = pulse_time.floor() as i32;
    hash_to_unit(hash_2d(instance, step as u32, PULSE_SALT))
}
