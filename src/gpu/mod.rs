pub mod mesh;
pub mod pipeline;
pub mod renderer;

pub use renderer::WgpuBackend;
