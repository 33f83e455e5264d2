//! Frame driver: owns the clone field's inputs, buffers and clock, and runs
//! generate-then-draw once per frame.
//!
//! Buffers are allocated lazily on the first frame that has every input, and
//! are released as a unit whenever the point source or template changes. A
//! frame with a missing input is skipped outright: nothing is allocated,
//! written or drawn, and the clock does not move.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{Bounds, CloneConfig};
use crate::generator;
use crate::instance::{DrawArgs, InstanceBatch, InstanceTransform};
use crate::material::{Gradient, Material};
use crate::mesh_asset::MeshAsset;
use crate::perf_profiling::FrameProfiler;
use crate::playback::{PlaybackController, PlaybackError, TimeControl};
use crate::point_cloud::PointSource;

/// Everything one instanced draw needs.
pub struct DrawCall<'a, B> {
    pub template: &'a MeshAsset,
    pub material: &'a Material,
    pub gradient: &'a Gradient,
    pub bounds: &'a Bounds,
    pub buffers: &'a B,
    pub args: &'a DrawArgs,
}

/// Where transforms go and how they get drawn.
///
/// `Buffers` is the backend's handle for one allocation: the transform storage
/// plus the indirect argument record. The driver owns the handle between
/// `allocate` and `release`.
pub trait RenderBackend {
    type Buffers;

    /// Create storage for `instance_count` transforms and one draw record.
    fn allocate(&mut self, instance_count: u32) -> Result<Self::Buffers>;

    /// Destroy an allocation.
    fn release(&mut self, buffers: Self::Buffers);

    fn write_draw_args(&mut self, buffers: &mut Self::Buffers, args: &DrawArgs);

    fn write_transforms(&mut self, buffers: &mut Self::Buffers, transforms: &[InstanceTransform]);

    /// Issue one instanced draw. Fire-and-forget.
    fn submit(&mut self, draw: DrawCall<'_, Self::Buffers>);
}

/// Why a frame was not drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPointSource,
    MissingTemplate,
    EmptyTemplate,
    MissingMaterial,
    MissingGradient,
    EmptyPointSource,
    AllocationFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::MissingPointSource => "no point source",
            SkipReason::MissingTemplate => "no template mesh",
            SkipReason::EmptyTemplate => "template mesh has no indices",
            SkipReason::MissingMaterial => "no material",
            SkipReason::MissingGradient => "no gradient",
            SkipReason::EmptyPointSource => "point source is empty",
            SkipReason::AllocationFailed => "buffer allocation failed",
        };
        f.write_str(text)
    }
}

/// Result of one `render` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn { instance_count: u32 },
    Skipped(SkipReason),
}

/// Buffers tied to one point source / template pairing.
struct FrameResources<B> {
    batch: InstanceBatch,
    transforms: Vec<InstanceTransform>,
    gpu: B,
    /// Last descriptor written to `gpu`.
    draw_args: Option<DrawArgs>,
}

pub struct FrameDriver<B: RenderBackend> {
    backend: B,
    points: Option<Arc<dyn PointSource>>,
    template: Option<Arc<MeshAsset>>,
    material: Option<Material>,
    gradient: Option<Gradient>,
    config: CloneConfig,
    playback: PlaybackController,
    profiler: FrameProfiler,
    resources: Option<FrameResources<B::Buffers>>,
}

impl<B: RenderBackend> FrameDriver<B> {
    pub fn new(backend: B, config: CloneConfig) -> Self {
        Self {
            backend,
            points: None,
            template: None,
            material: None,
            gradient: None,
            config: config.sanitized(),
            playback: PlaybackController::new(),
            profiler: FrameProfiler::new(),
            resources: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Replace the point source. Releases any allocated buffers.
    pub fn set_point_source(&mut self, points: Option<Arc<dyn PointSource>>) {
        self.points = points;
        self.release();
    }

    /// Replace the template mesh. Releases any allocated buffers.
    pub fn set_template(&mut self, template: Option<Arc<MeshAsset>>) {
        self.template = template;
        self.release();
    }

    pub fn set_material(&mut self, material: Option<Material>) {
        self.material = material;
    }

    pub fn set_gradient(&mut self, gradient: Option<Gradient>) {
        self.gradient = gradient;
    }

    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Mutable access for the clamping setters on [`CloneConfig`].
    pub fn config_mut(&mut self) -> &mut CloneConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: CloneConfig) {
        self.config = config.sanitized();
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn profiler_mut(&mut self) -> &mut FrameProfiler {
        &mut self.profiler
    }

    pub fn time(&self) -> f64 {
        self.playback.time()
    }

    pub fn is_allocated(&self) -> bool {
        self.resources.is_some()
    }

    /// Instance count of the current allocation.
    pub fn instance_count(&self) -> Option<u32> {
        self.resources.as_ref().map(|r| r.batch.instance_count())
    }

    /// Transforms from the most recent drawn frame.
    pub fn transforms(&self) -> Option<&[InstanceTransform]> {
        self.resources.as_ref().map(|r| r.transforms.as_slice())
    }

    /// Descriptor from the most recent drawn frame.
    pub fn draw_args(&self) -> Option<DrawArgs> {
        self.resources.as_ref().and_then(|r| r.draw_args)
    }

    /// First missing input, if any.
    fn missing_input(&self) -> Option<SkipReason> {
        match (&self.points, &self.template, &self.material, &self.gradient) {
            (None, _, _, _) => Some(SkipReason::MissingPointSource),
            (_, None, _, _) => Some(SkipReason::MissingTemplate),
            (_, _, None, _) => Some(SkipReason::MissingMaterial),
            (_, _, _, None) => Some(SkipReason::MissingGradient),
            (Some(points), _, _, _) if points.point_count() == 0 => {
                Some(SkipReason::EmptyPointSource)
            }
            (_, Some(template), _, _) if template.index_count() == 0 => {
                Some(SkipReason::EmptyTemplate)
            }
            _ => None,
        }
    }

    /// Allocate buffers for the current point source, replacing any existing
    /// allocation.
    pub fn allocate(&mut self) -> Result<()> {
        let point_count = match &self.points {
            Some(points) => points.point_count(),
            None => anyhow::bail!("Cannot allocate clone buffers without a point source"),
        };

        self.release();

        let batch = InstanceBatch::for_point_count(point_count);
        let instance_count = batch.instance_count();
        let gpu = self.backend.allocate(instance_count)?;

        log::info!(
            "Allocated clone buffers: {} points -> {} instances ({} groups)",
            point_count,
            instance_count,
            batch.group_count
        );

        self.resources = Some(FrameResources {
            batch,
            transforms: vec![InstanceTransform::default(); instance_count as usize],
            gpu,
            draw_args: None,
        });
        Ok(())
    }

    /// Release all buffers. The next `render` reallocates.
    pub fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            log::info!(
                "Released clone buffers ({} instances)",
                resources.batch.instance_count()
            );
            self.backend.release(resources.gpu);
        }
    }

    /// Generate and draw one frame, then advance the clock by `elapsed`.
    pub fn render(&mut self, elapsed: f32) -> FrameOutcome {
        if let Some(reason) = self.missing_input() {
            log::debug!("Skipping frame: {}", reason);
            return FrameOutcome::Skipped(reason);
        }

        if self.resources.is_none() {
            if let Err(e) = self.allocate() {
                log::error!("Failed to allocate clone buffers: {:#}", e);
                return FrameOutcome::Skipped(SkipReason::AllocationFailed);
            }
        }

        let (Some(points), Some(template), Some(material), Some(gradient), Some(resources)) = (
            self.points.as_ref(),
            self.template.as_ref(),
            self.material.as_ref(),
            self.gradient.as_ref(),
            self.resources.as_mut(),
        ) else {
            return FrameOutcome::Skipped(SkipReason::AllocationFailed);
        };

        // Snapshot: nothing below can observe a config edit mid-frame.
        let config = self.config;
        let time = self.playback.time() as f32;
        let instance_count = resources.batch.instance_count();

        let args = DrawArgs::new(template.index_count(), instance_count);
        if resources.draw_args != Some(args) {
            self.backend.write_draw_args(&mut resources.gpu, &args);
            resources.draw_args = Some(args);
        }

        let transforms = &mut resources.transforms;
        self.profiler.timed("generate", || {
            generator::generate(&**points, config, time, config.seed(), transforms)
        });

        self.backend.write_transforms(&mut resources.gpu, &resources.transforms);
        self.backend.submit(DrawCall {
            template,
            material,
            gradient,
            bounds: config.bounds(),
            buffers: &resources.gpu,
            args: &args,
        });

        self.playback.tick(elapsed);

        FrameOutcome::Drawn { instance_count }
    }
}

impl<B: RenderBackend> TimeControl for FrameDriver<B> {
    fn control_start(&mut self) {
        self.playback.start();
    }

    fn control_stop(&mut self) {
        self.playback.stop();
    }

    fn set_time(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        self.playback.seek(seconds)
    }
}

impl<B: RenderBackend> Drop for FrameDriver<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud::PointCloud;

    /// Backend that only counts calls.
    #[derive(Default)]
    struct CountingBackend {
        allocated: u32,
        released: u32,
        draws: u32,
        arg_writes: u32,
    }

    impl RenderBackend for CountingBackend {
        type Buffers = u32;

        fn allocate(&mut self, instance_count: u32) -> Result<u32> {
            self.allocated += 1;
            Ok(instance_count)
        }

        fn release(&mut self, _buffers: u32) {
            self.released += 1;
        }

        fn write_draw_args(&mut self, _buffers: &mut u32, _args: &DrawArgs) {
            self.arg_writes += 1;
        }

        fn write_transforms(&mut self, buffers: &mut u32, transforms: &[InstanceTransform]) {
            assert_eq!(*buffers as usize, transforms.len());
        }

        fn submit(&mut self, draw: DrawCall<'_, u32>) {
            assert_eq!(*draw.buffers, draw.args.instance_count);
            self.draws += 1;
        }
    }

    fn ready_driver() -> FrameDriver<CountingBackend> {
        let mut driver = FrameDriver::new(CountingBackend::default(), CloneConfig::default());
        driver.set_point_source(Some(Arc::new(PointCloud::sphere(4, 8, 1.0))));
        driver.set_template(Some(Arc::new(MeshAsset::cube())));
        driver.set_material(Some(Material::default()));
        driver.set_gradient(Some(Gradient::default()));
        driver
    }

    #[test]
    fn test_missing_inputs_reported_in_order() {
        let mut driver = FrameDriver::new(CountingBackend::default(), CloneConfig::default());
        assert_eq!(driver.render(0.1), FrameOutcome::Skipped(SkipReason::MissingPointSource));

        driver.set_point_source(Some(Arc::new(PointCloud::sphere(4, 8, 1.0))));
        assert_eq!(driver.render(0.1), FrameOutcome::Skipped(SkipReason::MissingTemplate));

        driver.set_template(Some(Arc::new(MeshAsset::cube())));
        assert_eq!(driver.render(0.1), FrameOutcome::Skipped(SkipReason::MissingMaterial));

        driver.set_material(Some(Material::default()));
        assert_eq!(driver.render(0.1), FrameOutcome::Skipped(SkipReason::MissingGradient));

        assert_eq!(driver.backend().allocated, 0);
        assert_eq!(driver.time(), 0.0);
    }

    #[test]
    fn test_draw_args_written_once() {
        let mut driver = ready_driver();
        for _ in 0..3 {
            assert!(matches!(driver.render(1.0 / 60.0), FrameOutcome::Drawn { .. }));
        }
        assert_eq!(driver.backend().allocated, 1);
        assert_eq!(driver.backend().arg_writes, 1);
        assert_eq!(driver.backend().draws, 3);
    }

    #[test]
    fn test_allocate_without_points_fails() {
        let mut driver = FrameDriver::new(CountingBackend::default(), CloneConfig::default());
        assert!(driver.allocate().is_err());
        assert!(!driver.is_allocated());
    }

    #[test]
    fn test_explicit_release() {
        let mut driver = ready_driver();
        driver.render(0.0);
        assert!(driver.is_allocated());

        driver.release();
        assert!(!driver.is_allocated());
        assert_eq!(driver.backend().released, 1);

        // Releasing twice is harmless
        driver.release();
        assert_eq!(driver.backend().released, 1);
    }

    #[test]
    fn test_time_control_through_driver() {
        let mut driver = ready_driver();
        driver.render(0.5);
        driver.control_start();
        driver.set_time(3.0).unwrap();
        driver.render(0.5);
        assert_eq!(driver.time(), 3.0);
        driver.control_stop();
        driver.render(0.5);
        assert_eq!(driver.time(), 3.5);
    }
}
