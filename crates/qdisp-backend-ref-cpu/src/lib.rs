pub mod config;
pub mod cpu;
mod fill;
mod quant;

pub use config::RefCpuConfig;
pub use cpu::{RefCpuBackend, RefCpuKernel};
pub use quant::QuantParams;
