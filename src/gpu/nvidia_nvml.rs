// Rust wrapper around the subset of libnvidia-ml we need.  The library is loaded at run time so
// that the binary runs (and can report a sensible error) on nodes without the NVIDIA driver.

use crate::gpuapi::InterfaceError;
use crate::util::cstrdup;

use libloading::Library;

use std::ffi::CStr;

////// C library API //////////////////////////////////////////////////////////////////////////////

// The data structures and signatures defined here must be exactly those defined in nvml.h, using
// types from `cty`.  See the NVML API reference for all documentation of functionality and units.

pub type NvmlReturn = cty::c_uint;
pub type NvmlDevice = *mut cty::c_void;

pub const NVML_SUCCESS: NvmlReturn = 0;
pub const NVML_ERROR_INVALID_ARGUMENT: NvmlReturn = 2;
pub const NVML_ERROR_NOT_SUPPORTED: NvmlReturn = 3;

pub const NVML_FEATURE_ENABLED: cty::c_uint = 1;
pub const NVML_P2P_CAPS_INDEX_READ: cty::c_uint = 0;
pub const NVML_P2P_STATUS_OK: cty::c_uint = 0;

// nvml.h as of CUDA 12.  Older drivers report NOT_SUPPORTED or INVALID_ARGUMENT beyond their own
// maximum, which is how the end of the link space is detected.
pub const NVML_NVLINK_MAX_LINKS: cty::c_uint = 18;

const NVML_DEVICE_NAME_V2_BUFFER_SIZE: usize = 96;

#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
pub struct NvmlMemory {
    pub total: cty::c_ulonglong,
    pub free: cty::c_ulonglong,
    pub used: cty::c_ulonglong,
}

#[repr(C)]
#[allow(dead_code)]
pub struct NvmlPciInfo {
    pub bus_id_legacy: [cty::c_char; 16],
    pub domain: cty::c_uint,
    pub bus: cty::c_uint,
    pub device: cty::c_uint,
    pub pci_device_id: cty::c_uint,
    pub pci_sub_system_id: cty::c_uint,
    pub bus_id: [cty::c_char; 32],
}

impl Default for NvmlPciInfo {
    fn default() -> Self {
        Self {
            bus_id_legacy: [0; 16],
            domain: 0,
            bus: 0,
            device: 0,
            pci_device_id: 0,
            pci_sub_system_id: 0,
            bus_id: [0; 32],
        }
    }
}

type InitFn = unsafe extern "C" fn() -> NvmlReturn;
type ShutdownFn = unsafe extern "C" fn() -> NvmlReturn;
type ErrorStringFn = unsafe extern "C" fn(NvmlReturn) -> *const cty::c_char;
type DeviceGetCountFn = unsafe extern "C" fn(*mut cty::c_uint) -> NvmlReturn;
type DeviceGetHandleByIndexFn = unsafe extern "C" fn(cty::c_uint, *mut NvmlDevice) -> NvmlReturn;
type DeviceGetNameFn =
    unsafe extern "C" fn(NvmlDevice, *mut cty::c_char, cty::c_uint) -> NvmlReturn;
type DeviceGetMemoryInfoFn = unsafe extern "C" fn(NvmlDevice, *mut NvmlMemory) -> NvmlReturn;
type DeviceGetPciInfoFn = unsafe extern "C" fn(NvmlDevice, *mut NvmlPciInfo) -> NvmlReturn;
type DeviceGetNvLinkStateFn =
    unsafe extern "C" fn(NvmlDevice, cty::c_uint, *mut cty::c_uint) -> NvmlReturn;
type DeviceGetNvLinkRemotePciInfoFn =
    unsafe extern "C" fn(NvmlDevice, cty::c_uint, *mut NvmlPciInfo) -> NvmlReturn;
type DeviceGetNvLinkVersionFn =
    unsafe extern "C" fn(NvmlDevice, cty::c_uint, *mut cty::c_uint) -> NvmlReturn;
type DeviceGetP2PStatusFn =
    unsafe extern "C" fn(NvmlDevice, NvmlDevice, cty::c_uint, *mut cty::c_uint) -> NvmlReturn;

////// End C library API //////////////////////////////////////////////////////////////////////////

// The loaded library and the entry points we use.  The function pointers are only valid while the
// library is loaded, which is for as long as the NvmlLib lives.  The caller is responsible for
// calling shutdown() before dropping it if init() succeeded.

pub struct NvmlLib {
    init: InitFn,
    shutdown: ShutdownFn,
    error_string: ErrorStringFn,
    device_get_count: DeviceGetCountFn,
    device_get_handle_by_index: DeviceGetHandleByIndexFn,
    device_get_name: DeviceGetNameFn,
    device_get_memory_info: DeviceGetMemoryInfoFn,
    device_get_pci_info: DeviceGetPciInfoFn,
    device_get_nvlink_state: DeviceGetNvLinkStateFn,
    device_get_nvlink_remote_pci_info: DeviceGetNvLinkRemotePciInfoFn,
    device_get_nvlink_version: DeviceGetNvLinkVersionFn,
    device_get_p2p_status: DeviceGetP2PStatusFn,
    // Dropped last, which unloads the library.
    _library: Library,
}

// Look up the NUL-terminated `name` and copy out the function pointer.  F must be a function
// pointer type whose signature matches the C declaration of `name`.
unsafe fn symbol<F: Copy>(library: &Library, name: &[u8]) -> Result<F, InterfaceError> {
    match library.get::<F>(name) {
        Ok(sym) => Ok(*sym),
        Err(e) => Err(InterfaceError::new("dlsym", 0, &e.to_string())),
    }
}

impl NvmlLib {
    pub fn load(path: &str) -> Result<NvmlLib, InterfaceError> {
        let library = unsafe { Library::new(path) }
            .map_err(|e| InterfaceError::new("dlopen", 0, &e.to_string()))?;
        unsafe { Self::resolve(library) }
    }

    unsafe fn resolve(library: Library) -> Result<NvmlLib, InterfaceError> {
        Ok(NvmlLib {
            init: symbol(&library, b"nvmlInit_v2\0")?,
            shutdown: symbol(&library, b"nvmlShutdown\0")?,
            error_string: symbol(&library, b"nvmlErrorString\0")?,
            device_get_count: symbol(&library, b"nvmlDeviceGetCount_v2\0")?,
            device_get_handle_by_index: symbol(&library, b"nvmlDeviceGetHandleByIndex_v2\0")?,
            device_get_name: symbol(&library, b"nvmlDeviceGetName\0")?,
            device_get_memory_info: symbol(&library, b"nvmlDeviceGetMemoryInfo\0")?,
            device_get_pci_info: symbol(&library, b"nvmlDeviceGetPciInfo_v3\0")?,
            device_get_nvlink_state: symbol(&library, b"nvmlDeviceGetNvLinkState\0")?,
            device_get_nvlink_remote_pci_info: symbol(
                &library,
                b"nvmlDeviceGetNvLinkRemotePciInfo_v2\0",
            )?,
            device_get_nvlink_version: symbol(&library, b"nvmlDeviceGetNvLinkVersion\0")?,
            device_get_p2p_status: symbol(&library, b"nvmlDeviceGetP2PStatus\0")?,
            _library: library,
        })
    }

    // Map an NVML return code to Ok or to an error naming the call.
    fn check(&self, call: &str, rc: NvmlReturn) -> Result<(), InterfaceError> {
        if rc == NVML_SUCCESS {
            return Ok(());
        }
        let s = unsafe { (self.error_string)(rc) };
        let detail = if s.is_null() {
            "unknown error".to_string()
        } else {
            unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
        };
        Err(InterfaceError {
            call: call.to_string(),
            code: rc as i32,
            detail,
        })
    }

    pub fn init(&self) -> Result<(), InterfaceError> {
        self.check("nvmlInit", unsafe { (self.init)() })
    }

    pub fn shutdown(&self) -> Result<(), InterfaceError> {
        self.check("nvmlShutdown", unsafe { (self.shutdown)() })
    }

    pub fn device_count(&self) -> Result<u32, InterfaceError> {
        let mut count: cty::c_uint = 0;
        self.check("nvmlDeviceGetCount", unsafe {
            (self.device_get_count)(&mut count)
        })?;
        Ok(count)
    }

    pub fn device_handle(&self, index: u32) -> Result<NvmlDevice, InterfaceError> {
        let mut dev: NvmlDevice = std::ptr::null_mut();
        self.check("nvmlDeviceGetHandleByIndex", unsafe {
            (self.device_get_handle_by_index)(index, &mut dev)
        })?;
        Ok(dev)
    }

    pub fn device_name(&self, dev: NvmlDevice) -> Result<String, InterfaceError> {
        let mut buf: [cty::c_char; NVML_DEVICE_NAME_V2_BUFFER_SIZE] =
            [0; NVML_DEVICE_NAME_V2_BUFFER_SIZE];
        self.check("nvmlDeviceGetName", unsafe {
            (self.device_get_name)(dev, buf.as_mut_ptr(), buf.len() as cty::c_uint)
        })?;
        Ok(cstrdup(&buf))
    }

    pub fn memory_info(&self, dev: NvmlDevice) -> Result<NvmlMemory, InterfaceError> {
        let mut mem: NvmlMemory = Default::default();
        self.check("nvmlDeviceGetMemoryInfo", unsafe {
            (self.device_get_memory_info)(dev, &mut mem)
        })?;
        Ok(mem)
    }

    pub fn bus_id(&self, dev: NvmlDevice) -> Result<String, InterfaceError> {
        let mut pci: NvmlPciInfo = Default::default();
        self.check("nvmlDeviceGetPciInfo", unsafe {
            (self.device_get_pci_info)(dev, &mut pci)
        })?;
        Ok(cstrdup(&pci.bus_id))
    }

    // Returns the raw return code alongside the result so that the caller can tell "no such link"
    // from a real failure.
    pub fn nvlink_state(
        &self,
        dev: NvmlDevice,
        link: u32,
    ) -> (NvmlReturn, Result<bool, InterfaceError>) {
        let mut state: cty::c_uint = 0;
        let rc = unsafe { (self.device_get_nvlink_state)(dev, link, &mut state) };
        (
            rc,
            self.check("nvmlDeviceGetNvLinkState", rc)
                .map(|_| state == NVML_FEATURE_ENABLED),
        )
    }

    pub fn nvlink_remote_bus_id(
        &self,
        dev: NvmlDevice,
        link: u32,
    ) -> Result<String, InterfaceError> {
        let mut pci: NvmlPciInfo = Default::default();
        self.check("nvmlDeviceGetNvLinkRemotePciInfo", unsafe {
            (self.device_get_nvlink_remote_pci_info)(dev, link, &mut pci)
        })?;
        Ok(cstrdup(&pci.bus_id))
    }

    pub fn nvlink_version(&self, dev: NvmlDevice, link: u32) -> Result<u32, InterfaceError> {
        let mut version: cty::c_uint = 0;
        self.check("nvmlDeviceGetNvLinkVersion", unsafe {
            (self.device_get_nvlink_version)(dev, link, &mut version)
        })?;
        Ok(version)
    }

    pub fn p2p_read_ok(&self, from: NvmlDevice, to: NvmlDevice) -> Result<bool, InterfaceError> {
        let mut status: cty::c_uint = 0;
        self.check("nvmlDeviceGetP2PStatus", unsafe {
            (self.device_get_p2p_status)(from, to, NVML_P2P_CAPS_INDEX_READ, &mut status)
        })?;
        Ok(status == NVML_P2P_STATUS_OK)
    }
}
