// A scriptable management interface for tests.  Devices are added in index order and get the
// location "0000:XX:00.0" where XX is the index in hex.  Links are numbered per device in the order
// they are added.

use crate::gpuapi::{Device, GpuAPI, InterfaceError, Session};
use crate::types::{DeviceIndex, LinkIndex, Location};

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub enum MockLink {
    Inactive,
    Active { remote: Location, generation: u32 },
    FailStatus,
    FailRemote,
    FailGeneration { remote: Location },
}

#[derive(Default)]
pub struct MockGpuAPI {
    devices: Vec<Device>,
    links: HashMap<DeviceIndex, Vec<MockLink>>,
    failing_link_count: HashSet<DeviceIndex>,
    peers: HashSet<(DeviceIndex, DeviceIndex)>,
    failing_peers: HashSet<(DeviceIndex, DeviceIndex)>,
    failing_enumerations: Cell<usize>,
    failing_open: bool,
    failing_close: bool,
    opens: Cell<usize>,
    closes: Cell<usize>,
    releases: Cell<usize>,
}

pub fn location_of(index: DeviceIndex) -> Location {
    format!("0000:{index:02X}:00.0")
}

pub const GIB: u64 = 1024 * 1024 * 1024;

#[allow(dead_code)]
impl MockGpuAPI {
    pub fn new() -> MockGpuAPI {
        Default::default()
    }

    pub fn with_device(mut self, name: &str, mem_total: u64) -> MockGpuAPI {
        let index = self.devices.len();
        self.devices.push(Device {
            index,
            name: name.to_string(),
            mem_total,
            mem_used: 0,
            location: location_of(index),
        });
        self
    }

    pub fn with_devices(mut self, n: usize, name: &str, mem_total: u64) -> MockGpuAPI {
        for _ in 0..n {
            self = self.with_device(name, mem_total);
        }
        self
    }

    pub fn with_mem_used(mut self, index: DeviceIndex, mem_used: u64) -> MockGpuAPI {
        self.devices[index].mem_used = mem_used;
        self
    }

    pub fn with_raw_link(mut self, from: DeviceIndex, link: MockLink) -> MockGpuAPI {
        self.links.entry(from).or_default().push(link);
        self
    }

    pub fn with_link(self, from: DeviceIndex, to: DeviceIndex, generation: u32) -> MockGpuAPI {
        self.with_raw_link(
            from,
            MockLink::Active {
                remote: location_of(to),
                generation,
            },
        )
    }

    // Links in both directions, as hardware reports them.
    pub fn with_nvlink(self, a: DeviceIndex, b: DeviceIndex, generation: u32) -> MockGpuAPI {
        self.with_link(a, b, generation).with_link(b, a, generation)
    }

    pub fn with_failing_link_count(mut self, index: DeviceIndex) -> MockGpuAPI {
        self.failing_link_count.insert(index);
        self
    }

    pub fn with_peer_access(mut self, from: DeviceIndex, to: DeviceIndex) -> MockGpuAPI {
        self.peers.insert((from, to));
        self
    }

    pub fn with_failing_peer_access(mut self, from: DeviceIndex, to: DeviceIndex) -> MockGpuAPI {
        self.failing_peers.insert((from, to));
        self
    }

    // The next `n` device enumerations fail.
    pub fn with_failing_enumerations(self, n: usize) -> MockGpuAPI {
        self.failing_enumerations.set(n);
        self
    }

    pub fn with_failing_open(mut self) -> MockGpuAPI {
        self.failing_open = true;
        self
    }

    pub fn with_failing_close(mut self) -> MockGpuAPI {
        self.failing_close = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    pub fn closes(&self) -> usize {
        self.closes.get()
    }

    // Sessions given back, by close() or by being dropped.
    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    fn link(&self, device: &Device, link: LinkIndex) -> Result<&MockLink, InterfaceError> {
        self.links
            .get(&device.index)
            .and_then(|ls| ls.get(link as usize))
            .ok_or_else(|| InterfaceError::new("link", 2, "Invalid Argument"))
    }
}

impl GpuAPI for MockGpuAPI {
    fn open(&self) -> Result<Box<dyn Session + '_>, InterfaceError> {
        if self.failing_open {
            return Err(InterfaceError::new("open", 9, "Driver Not Loaded"));
        }
        self.opens.set(self.opens.get() + 1);
        Ok(Box::new(MockSession {
            api: self,
            closed: false,
        }))
    }
}

pub struct MockSession<'a> {
    api: &'a MockGpuAPI,
    closed: bool,
}

impl<'a> Session for MockSession<'a> {
    fn enumerate_devices(&self) -> Result<Vec<Device>, InterfaceError> {
        let failing = self.api.failing_enumerations.get();
        if failing > 0 {
            self.api.failing_enumerations.set(failing - 1);
            return Err(InterfaceError::new("enumerate_devices", 999, "Unknown Error"));
        }
        Ok(self.api.devices.clone())
    }

    fn link_count(&self, device: &Device) -> Result<u32, InterfaceError> {
        if self.api.failing_link_count.contains(&device.index) {
            return Err(InterfaceError::new("link_count", 15, "GPU is lost"));
        }
        Ok(self
            .api
            .links
            .get(&device.index)
            .map(|ls| ls.len() as u32)
            .unwrap_or(0))
    }

    fn link_active(&self, device: &Device, link: LinkIndex) -> Result<bool, InterfaceError> {
        match self.api.link(device, link)? {
            MockLink::Inactive => Ok(false),
            MockLink::FailStatus => Err(InterfaceError::new("link_active", 999, "Unknown Error")),
            _ => Ok(true),
        }
    }

    fn link_remote(&self, device: &Device, link: LinkIndex) -> Result<Location, InterfaceError> {
        match self.api.link(device, link)? {
            MockLink::Active { remote, .. } | MockLink::FailGeneration { remote } => {
                Ok(remote.clone())
            }
            _ => Err(InterfaceError::new("link_remote", 999, "Unknown Error")),
        }
    }

    fn link_generation(&self, device: &Device, link: LinkIndex) -> Result<u32, InterfaceError> {
        match self.api.link(device, link)? {
            MockLink::Active { generation, .. } => Ok(*generation),
            _ => Err(InterfaceError::new("link_generation", 999, "Unknown Error")),
        }
    }

    fn peer_access(&self, from: &Device, to: &Device) -> Result<bool, InterfaceError> {
        let key = (from.index, to.index);
        if self.api.failing_peers.contains(&key) {
            return Err(InterfaceError::new("peer_access", 999, "Unknown Error"));
        }
        Ok(self.api.peers.contains(&key))
    }

    fn close(mut self: Box<Self>) -> Result<(), InterfaceError> {
        self.closed = true;
        self.api.closes.set(self.api.closes.get() + 1);
        self.api.releases.set(self.api.releases.get() + 1);
        if self.api.failing_close {
            return Err(InterfaceError::new("close", 999, "Unknown Error"));
        }
        Ok(())
    }
}

impl<'a> Drop for MockSession<'a> {
    fn drop(&mut self) {
        if !self.closed {
            self.api.releases.set(self.api.releases.get() + 1);
        }
    }
}
