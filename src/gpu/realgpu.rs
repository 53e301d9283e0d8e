use crate::gpuapi::{GpuAPI, InterfaceError, Session};

#[cfg(feature = "nvidia")]
use crate::gpu::nvidia;

pub const DEFAULT_NVML_LIBRARY: &str = "libnvidia-ml.so.1";

pub struct RealGpu {
    #[allow(dead_code)]
    library: String,
}

impl RealGpu {
    pub fn new(library: Option<String>) -> RealGpu {
        RealGpu {
            library: library.unwrap_or_else(|| DEFAULT_NVML_LIBRARY.to_string()),
        }
    }
}

impl GpuAPI for RealGpu {
    #[cfg(feature = "nvidia")]
    fn open(&self) -> Result<Box<dyn Session + '_>, InterfaceError> {
        Ok(Box::new(nvidia::open(&self.library)?))
    }

    #[cfg(not(feature = "nvidia"))]
    fn open(&self) -> Result<Box<dyn Session + '_>, InterfaceError> {
        Err(InterfaceError::new(
            "open",
            0,
            "built without support for any management interface",
        ))
    }
}
