use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::CloneConfig;
use crate::driver::{FrameDriver, FrameOutcome};
use crate::generator;
use crate::gpu::WgpuBackend;
use crate::instance::{InstanceBatch, InstanceTransform};
use crate::material::{Gradient, Material};
use crate::mesh_asset::MeshAsset;
use crate::playback::TimeControl;
use crate::point_cloud::{PointCloud, PointSource};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the clone field to PNG frames
    Render {
        /// Point source: an OBJ file, or `sphere`
        #[arg(long)]
        points: String,

        /// Template mesh: an OBJ file, `cube` or `sphere`
        #[arg(long, default_value = "cube")]
        template: String,

        /// Clone configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 5.0)]
        duration: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Drive time from a timeline starting here instead of free-running
        #[arg(long)]
        timeline_start: Option<f64>,

        /// Log average generation time
        #[arg(long)]
        profile: bool,
    },
    /// Generate one frame on the CPU and write the transforms as JSON
    Dump {
        /// Point source: an OBJ file, or `sphere`
        #[arg(long)]
        points: String,

        /// Clone configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Playback time in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f32,

        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            points,
            template,
            config,
            out,
            fps,
            duration,
            width,
            height,
            timeline_start,
            profile,
        } => {
            let job = RenderJob {
                points: load_points(&points)?,
                template: Arc::new(load_template(&template)?),
                config: load_config(config.as_deref())?,
                out_dir: out,
                fps,
                duration,
                width,
                height,
                timeline_start,
                profile,
            };
            render_offline(job)?;
        }
        Commands::Dump {
            points,
            config,
            time,
            out,
        } => {
            let points = load_points(&points)?;
            let config = load_config(config.as_deref())?;
            dump_frame(&*points, config, time, out.as_deref())?;
        }
    }
    Ok(())
}

fn load_points(spec: &str) -> Result<Arc<dyn PointSource>> {
    let cloud = match spec {
        "sphere" => PointCloud::sphere(24, 48, 2.0),
        path => PointCloud::from_mesh_asset(&MeshAsset::load(Path::new(path))?),
    };
    log::info!("Point source '{}': {} points", spec, cloud.len());
    Ok(Arc::new(cloud))
}

fn load_template(spec: &str) -> Result<MeshAsset> {
    match spec {
        "cube" => Ok(MeshAsset::cube()),
        "sphere" => Ok(MeshAsset::sphere(8, 12, 0.5)),
        path => MeshAsset::load(Path::new(path)),
    }
}

fn load_config(path: Option<&Path>) -> Result<CloneConfig> {
    match path {
        Some(path) => CloneConfig::load(path),
        None => Ok(CloneConfig::default()),
    }
}

struct RenderJob {
    points: Arc<dyn PointSource>,
    template: Arc<MeshAsset>,
    config: CloneConfig,
    out_dir: PathBuf,
    fps: f32,
    duration: f32,
    width: u32,
    height: u32,
    timeline_start: Option<f64>,
    profile: bool,
}

fn render_offline(job: RenderJob) -> Result<()> {
    if job.fps.is_nan() || job.fps <= 0.0 {
        anyhow::bail!("--fps must be positive, got {}", job.fps);
    }
    let total_frames = (job.duration.max(0.0) * job.fps).ceil() as usize;
    let dt = 1.0 / job.fps;

    std::fs::create_dir_all(&job.out_dir)
        .with_context(|| format!("Failed to create {}", job.out_dir.display()))?;

    let backend = WgpuBackend::new_headless(job.width, job.height)?;
    let mut driver = FrameDriver::new(backend, job.config);
    driver.set_point_source(Some(job.points));
    driver.set_template(Some(job.template));
    driver.set_material(Some(Material::default()));
    driver.set_gradient(Some(Gradient::default()));
    driver.profiler_mut().set_enabled(job.profile);

    if job.timeline_start.is_some() {
        driver.control_start();
    }

    log::info!(
        "Rendering {} frames to {}",
        total_frames,
        job.out_dir.display()
    );

    for frame in 0..total_frames {
        if let Some(start) = job.timeline_start {
            driver.set_time(start + frame as f64 / job.fps as f64)?;
        }

        match driver.render(dt) {
            FrameOutcome::Drawn { .. } => {
                let frame_path = job.out_dir.join(format!("frame_{:05}.png", frame));
                driver.backend().save_frame(&frame_path)?;
            }
            FrameOutcome::Skipped(reason) => {
                log::warn!("Frame {} skipped: {}", frame, reason);
            }
        }

        if frame % 60 == 0 {
            log::info!("Frame {}/{} (t={:.3}s)", frame, total_frames, driver.time());
        }
    }

    log::info!("Done.");
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameDump {
    time: f32,
    seed: i32,
    point_count: u32,
    instance_count: u32,
    config: CloneConfig,
    transforms: Vec<InstanceTransform>,
}

fn dump_frame(
    points: &dyn PointSource,
    config: CloneConfig,
    time: f32,
    out: Option<&Path>,
) -> Result<()> {
    let batch = InstanceBatch::for_point_count(points.point_count());
    let dump = FrameDump {
        time,
        seed: config.seed(),
        point_count: batch.point_count,
        instance_count: batch.instance_count(),
        config,
        transforms: generator::generate_vec(points, config, time, config.seed()),
    };

    let json = serde_json::to_string_pretty(&dump).context("Failed to serialize frame")?;
    match out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_defaults() {
        let cli = Cli::try_parse_from([
            "pointclone",
            "render",
            "--points",
            "sphere",
            "--out",
            "frames",
        ])
        .unwrap();
        match cli.command {
            Commands::Render {
                template,
                fps,
                timeline_start,
                profile,
                ..
            } => {
                assert_eq!(template, "cube");
                assert_eq!(fps, 60.0);
                assert!(timeline_start.is_none());
                assert!(!profile);
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_parse_timeline_start() {
        let cli = Cli::try_parse_from([
            "pointclone",
            "render",
            "--points",
            "sphere",
            "--out",
            "frames",
            "--timeline-start",
            "12.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { timeline_start, .. } => assert_eq!(timeline_start, Some(12.5)),
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_builtin_sources() {
        assert!(load_points("sphere").unwrap().point_count() > 0);
        assert_eq!(load_template("cube").unwrap().index_count(), 36);
        assert!(load_template("missing.obj").is_err());
    }

    #[test]
    fn test_dump_frame_writes_json() {
        let dir = std::env::temp_dir().join(format!("pointclone-dump-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.json");

        let cloud = PointCloud::sphere(4, 8, 1.0);
        dump_frame(&cloud, CloneConfig::default(), 1.5, Some(&path)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["time"], 1.5);
        assert_eq!(value["instanceCount"], 64);
        assert_eq!(value["transforms"].as_array().unwrap().len(), 64);
        std::fs::remove_dir_all(&dir).ok();
    }
}
