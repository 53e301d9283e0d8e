#[cfg(feature = "nvidia")]
mod nvidia;
#[cfg(feature = "nvidia")]
mod nvidia_nvml;
pub mod realgpu;
