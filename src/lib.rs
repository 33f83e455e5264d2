pub mod noise;
pub mod config;
pub mod mesh_asset;
pub mod point_cloud;
pub mod material;
pub mod instance;
pub mod generator;
pub mod playback;
pub mod driver;
pub mod perf_profiling;
pub mod gpu;

pub mod cli;
