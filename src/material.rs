//! Surface appearance handed through to the draw call.
//!
//! The generator never looks at these; the frame driver only checks that both
//! are present before drawing, and the render backend decides what to do with
//! them.

/// Shading model selected by a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shading {
    /// Simple directional lighting from the vertex normal.
    #[default]
    Lit,
    /// Flat gradient color.
    Unlit,
}

/// A named material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub shading: Shading,
    /// Multiplier applied to the final color.
    pub emission: f32,
}

impl Material {
    pub fn new(name: impl Into<String>, shading: Shading) -> Self {
        Self {
            name: name.into(),
            shading,
            emission: 1.0,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", Shading::Lit)
    }
}

/// One color stop of a gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientKey {
    /// Position along the gradient, 0..=1.
    pub position: f32,
    /// Linear RGBA.
    pub color: [f32; 4],
}

/// Piecewise-linear color ramp used to tint instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    keys: Vec<GradientKey>,
}

impl Default for Gradient {
    fn default() -> Self {
        Self::new(vec![
            GradientKey {
                position: 0.0,
                color: [1.0, 0.45, 0.15, 1.0],
            },
            GradientKey {
                position: 1.0,
                color: [0.2, 0.5, 1.0, 1.0],
            },
        ])
    }
}

impl Gradient {
    /// Build a gradient. Keys are sorted by position and positions are clamped
    /// to `[0, 1]`. An empty key list yields solid white.
    pub fn new(mut keys: Vec<GradientKey>) -> Self {
        if keys.is_empty() {
            keys.push(GradientKey {
                position: 0.0,
                color: [1.0; 4],
            });
        }
        for key in &mut keys {
            key.position = key.position.clamp(0.0, 1.0);
        }
        keys.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { keys }
    }

    /// Solid color.
    pub fn solid(color: [f32; 4]) -> Self {
        Self::new(vec![GradientKey {
            position: 0.0,
            color,
        }])
    }

    pub fn keys(&self) -> &[GradientKey] {
        &self.keys
    }

    /// Color at `t`, clamped to the end keys.
    pub fn sample(&self, t: f32) -> [f32; 4] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        let first = self.keys[0];
        if t <= first.position {
            return first.color;
        }

        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.position {
                let span = b.position - a.position;
                let f = if span > 0.0 { (t - a.position) / span } else { 1.0 };
                let mut color = [0.0; 4];
                for (c, (x, y)) in color.iter_mut().zip(a.color.iter().zip(b.color.iter())) {
                    *c = x + (y - x) * f;
                }
                return color;
            }
        }

        self.keys[self.keys.len() - 1].color
    }

    /// Evenly spaced samples, for uploading as a lookup table.
    pub fn bake<const N: usize>(&self) -> [[f32; 4]; N] {
        let mut table = [[0.0; 4]; N];
        let denom = N.saturating_sub(1).max(1) as f32;
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = self.sample(i as f32 / denom);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_key() -> Gradient {
        Gradient::new(vec![
            GradientKey {
                position: 1.0,
                color: [1.0, 1.0, 1.0, 1.0],
            },
            GradientKey {
                position: 0.0,
                color: [0.0, 0.0, 0.0, 1.0],
            },
        ])
    }

    #[test]
    fn test_keys_are_sorted() {
        let gradient = two_key();
        assert_eq!(gradient.keys()[0].position, 0.0);
        assert_eq!(gradient.keys()[1].position, 1.0);
    }

    #[test]
    fn test_sample_interpolates_and_clamps() {
        let gradient = two_key();
        assert_eq!(gradient.sample(-1.0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(gradient.sample(2.0), [1.0, 1.0, 1.0, 1.0]);
        let mid = gradient.sample(0.5);
        assert!((mid[0] - 0.5).abs() < 1e-6);
        assert_eq!(mid[3], 1.0);
    }

    #[test]
    fn test_empty_gradient_is_white() {
        let gradient = Gradient::new(Vec::new());
        assert_eq!(gradient.sample(0.3), [1.0; 4]);
    }

    #[test]
    fn test_bake_endpoints() {
        let table: [[f32; 4]; 8] = two_key().bake();
        assert_eq!(table[0], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(table[7], [1.0, 1.0, 1.0, 1.0]);
    }
}
