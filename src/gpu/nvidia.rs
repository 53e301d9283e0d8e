use crate::gpu::nvidia_nvml::{
    NvmlLib, NvmlReturn, NVML_ERROR_INVALID_ARGUMENT, NVML_ERROR_NOT_SUPPORTED,
    NVML_NVLINK_MAX_LINKS,
};
use crate::gpuapi::{Device, InterfaceError, Session};
use crate::types::{LinkIndex, Location};

use std::path::Path;

pub struct NvidiaSession {
    lib: NvmlLib,
    released: bool,
}

// Load the library and initialize NVML.  The session owns the initialized library and shuts it
// down on close, or on drop if close was never called.
pub fn open(library: &str) -> Result<NvidiaSession, InterfaceError> {
    let lib = match NvmlLib::load(library) {
        Ok(lib) => lib,
        Err(mut e) => {
            if !nvidia_present() {
                e.detail += " (no NVIDIA kernel module is loaded)";
            }
            return Err(e);
        }
    };
    lib.init()?;
    log::debug!("NVML initialized from {library}");
    Ok(NvidiaSession {
        lib,
        released: false,
    })
}

impl NvidiaSession {
    fn handle(&self, device: &Device) -> Result<*mut cty::c_void, InterfaceError> {
        self.lib.device_handle(device.index as u32)
    }

    fn describe(&self, index: u32) -> Result<Device, InterfaceError> {
        let dev = self.lib.device_handle(index)?;
        let mem = self.lib.memory_info(dev)?;
        Ok(Device {
            index: index as usize,
            name: self.lib.device_name(dev)?,
            mem_total: mem.total,
            mem_used: mem.used,
            location: self.lib.bus_id(dev)?,
        })
    }
}

// NVML has no call for the number of links.  Links are numbered from zero and `state(link)` is
// asked for each link in turn.  INVALID_ARGUMENT means we are past the last link the device has.
// NOT_SUPPORTED means this link is not there, but later ones may be (a card without NVLink says it
// for every link).  The count is one past the last link that answered, and any other error fails
// the count.
pub fn count_links<F>(mut state: F) -> Result<u32, InterfaceError>
where
    F: FnMut(LinkIndex) -> (NvmlReturn, Result<bool, InterfaceError>),
{
    let mut count = 0;
    for link in 0..NVML_NVLINK_MAX_LINKS {
        match state(link) {
            (_, Ok(_)) => count = link + 1,
            (NVML_ERROR_NOT_SUPPORTED, Err(_)) => {}
            (NVML_ERROR_INVALID_ARGUMENT, Err(_)) => break,
            (_, Err(e)) => return Err(e),
        }
    }
    Ok(count)
}

impl Session for NvidiaSession {
    fn enumerate_devices(&self) -> Result<Vec<Device>, InterfaceError> {
        let count = self.lib.device_count()?;
        let mut result = vec![];
        for index in 0..count {
            let device = self.describe(index).map_err(|e| e.for_device(index as usize))?;
            result.push(device);
        }
        Ok(result)
    }

    fn link_count(&self, device: &Device) -> Result<u32, InterfaceError> {
        let dev = self.handle(device)?;
        count_links(|link| self.lib.nvlink_state(dev, link))
    }

    // A link inside the counted range can still be unsupported; it is never active.
    fn link_active(&self, device: &Device, link: LinkIndex) -> Result<bool, InterfaceError> {
        let dev = self.handle(device)?;
        match self.lib.nvlink_state(dev, link) {
            (NVML_ERROR_NOT_SUPPORTED, Err(_)) => Ok(false),
            (_, result) => result,
        }
    }

    fn link_remote(&self, device: &Device, link: LinkIndex) -> Result<Location, InterfaceError> {
        let dev = self.handle(device)?;
        self.lib.nvlink_remote_bus_id(dev, link)
    }

    fn link_generation(&self, device: &Device, link: LinkIndex) -> Result<u32, InterfaceError> {
        let dev = self.handle(device)?;
        self.lib.nvlink_version(dev, link)
    }

    fn peer_access(&self, from: &Device, to: &Device) -> Result<bool, InterfaceError> {
        let a = self.handle(from)?;
        let b = self.handle(to)?;
        self.lib.p2p_read_ok(a, b)
    }

    fn close(mut self: Box<Self>) -> Result<(), InterfaceError> {
        self.released = true;
        self.lib.shutdown()
    }
}

impl Drop for NvidiaSession {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.lib.shutdown() {
                log::error!("{e}");
            }
        }
    }
}

// On all nodes we've looked at, /sys/module/nvidia exists iff there are nvidia accelerators
// present.

fn nvidia_present() -> bool {
    Path::new("/sys/module/nvidia").exists()
}
