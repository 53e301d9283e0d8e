// Low-level but common API to the management interface of the cards installed on the node.

use crate::types::{DeviceIndex, LinkIndex, Location};

// The device index is zero-based and devices are densely packed in the index space.  The index is
// stable for the lifetime of one session, but not across sessions.
//
// The location MUST be usable for equality comparisons across independent lookups: the location
// that device A reports for the remote end of one of its links must compare equal to the location
// that device B reports for itself if and only if the link goes to B.

#[derive(PartialEq, Eq, Default, Clone, Debug)]
pub struct Device {
    pub index: DeviceIndex,
    pub name: String,
    pub mem_total: u64, // bytes
    pub mem_used: u64,  // bytes
    pub location: Location,
}

// Every call into the management interface can fail independently.  `call` names the operation
// that failed, `code` is the interface's own return code (0 when there is none) and `detail` is
// its description of the problem.

#[derive(PartialEq, Eq, Clone, Debug, thiserror::Error)]
#[error("{call} failed: {detail} (code {code})")]
pub struct InterfaceError {
    pub call: String,
    pub code: i32,
    pub detail: String,
}

impl InterfaceError {
    pub fn new(call: &str, code: i32, detail: &str) -> InterfaceError {
        InterfaceError {
            call: call.to_string(),
            code,
            detail: detail.to_string(),
        }
    }

    // Name the device the failing call was about.
    pub fn for_device(mut self, index: DeviceIndex) -> InterfaceError {
        self.call = format!("{} for GPU {index}", self.call);
        self
    }
}

// An open session with the management interface.  A session is obtained from GpuAPI::open() and
// must be released with close(), which consumes it.  Implementations must also release the
// interface if the session is dropped without being closed, so that early returns and panics do
// not leak it.
pub trait Session {
    // List the present devices.  The returned vector is sorted by index, and indices are tightly
    // packed starting at zero.
    fn enumerate_devices(&self) -> Result<Vec<Device>, InterfaceError>;

    // The number of interconnect endpoints exposed by the device.  Links are numbered
    // 0..link_count().
    fn link_count(&self, device: &Device) -> Result<u32, InterfaceError>;

    fn link_active(&self, device: &Device, link: LinkIndex) -> Result<bool, InterfaceError>;

    // Location of the device at the other end of the link.  Only meaningful for an active link.
    fn link_remote(&self, device: &Device, link: LinkIndex) -> Result<Location, InterfaceError>;

    // Protocol generation of the link, a small positive integer.  Only meaningful for an active
    // link.
    fn link_generation(&self, device: &Device, link: LinkIndex) -> Result<u32, InterfaceError>;

    // Can `from` directly access the memory of `to`?  This is not guaranteed to be symmetric.
    fn peer_access(&self, from: &Device, to: &Device) -> Result<bool, InterfaceError>;

    fn close(self: Box<Self>) -> Result<(), InterfaceError>;
}

// Acquire the management interface.
pub trait GpuAPI {
    fn open(&self) -> Result<Box<dyn Session + '_>, InterfaceError>;
}

// Run `f` within a session and release the session on every exit path.  An error from `f` takes
// precedence over an error from closing the session, but the latter is still logged.
pub fn with_session<T, F>(api: &dyn GpuAPI, f: F) -> Result<T, String>
where
    F: FnOnce(&dyn Session) -> Result<T, String>,
{
    let session = api
        .open()
        .map_err(|e| format!("Could not initialize the management interface: {e}"))?;
    let result = f(session.as_ref());
    match (result, session.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(format!("Could not shut down the management interface: {e}")),
        (Err(msg), Ok(())) => Err(msg),
        (Err(msg), Err(e)) => {
            log::error!("Could not shut down the management interface: {e}");
            Err(msg)
        }
    }
}
