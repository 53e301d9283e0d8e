// Discover the NVLink topology of the node.
//
// For each device we walk its links, resolve the device at the far end of every active link by its
// location, and record one Connection per unordered pair of devices.  Both ends of a link normally
// report it, so the same pair is observed twice; only the first observation is recorded, in the
// direction it was observed.
//
// Failures reading a single link (or a device's link count) are logged and the link contributes
// nothing.  Failures enumerating the devices are not recoverable here and are returned to the
// caller.

use crate::gpuapi::{Device, InterfaceError, Session};
use crate::types::{DeviceIndex, LinkIndex, Location};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

// Per-link bandwidth of a connection, in GB/s.  A generation we don't know about has no known
// bandwidth; that is not the same as a bandwidth of zero, but gbps() reports it as zero so that
// sums and comparisons still work.

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Bandwidth {
    Known(u32),
    Unknown { generation: u32 },
}

impl Bandwidth {
    pub fn for_generation(generation: u32) -> Bandwidth {
        match generation {
            1 => Bandwidth::Known(20),
            2 => Bandwidth::Known(25),
            3 => Bandwidth::Known(50),
            4 => Bandwidth::Known(100),
            _ => Bandwidth::Unknown { generation },
        }
    }

    pub fn gbps(&self) -> u32 {
        match self {
            Bandwidth::Known(gbps) => *gbps,
            Bandwidth::Unknown { .. } => 0,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Bandwidth::Known(_))
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Known(gbps) => write!(f, "{gbps} GB/s"),
            Bandwidth::Unknown { generation } => {
                write!(f, "unknown (NVLink generation {generation})")
            }
        }
    }
}

// A deduplicated pair of linked devices.  `a` is the device whose link was observed first.

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Connection {
    pub a: DeviceIndex,
    pub b: DeviceIndex,
    pub bandwidth: Bandwidth,
    pub combined_mem: u64, // bytes
}

impl Connection {
    pub fn pair(&self) -> (DeviceIndex, DeviceIndex) {
        (self.a, self.b)
    }
}

// Square matrix, indexed [from][to].  Topology discovery always sets both directions, but readers
// should not depend on that.

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Adjacency {
    cells: Vec<Vec<bool>>,
}

impl Adjacency {
    pub fn new(n: usize) -> Adjacency {
        Adjacency {
            cells: vec![vec![false; n]; n],
        }
    }

    #[cfg(test)]
    pub fn from_rows(cells: Vec<Vec<bool>>) -> Adjacency {
        Adjacency { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, from: DeviceIndex, to: DeviceIndex) -> bool {
        self.cells[from][to]
    }

    pub fn set(&mut self, from: DeviceIndex, to: DeviceIndex) {
        self.cells[from][to] = true;
    }

    // Treat the relation as undirected.
    pub fn linked(&self, x: DeviceIndex, y: DeviceIndex) -> bool {
        self.cells[x][y] || self.cells[y][x]
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.cells
    }
}

pub struct Topology {
    pub adjacency: Adjacency,
    pub connections: Vec<Connection>, // In discovery order
    pub bandwidth: BTreeMap<(DeviceIndex, DeviceIndex), Bandwidth>,
}

// Enumerate the devices and discover the topology among them.  The device list is returned too
// since the report needs it.
pub fn discover(session: &dyn Session) -> Result<(Vec<Device>, Topology), String> {
    let devices = session
        .enumerate_devices()
        .map_err(|e| format!("Device enumeration failed: {e}"))?;
    log::debug!("Found {} devices", devices.len());
    let topology = build_topology(session, &devices);
    Ok((devices, topology))
}

pub fn build_topology(session: &dyn Session, devices: &[Device]) -> Topology {
    let n = devices.len();
    let locations = location_index(devices);

    let mut adjacency = Adjacency::new(n);
    let mut connections = vec![];
    let mut seen = HashSet::new();
    let mut bandwidth = BTreeMap::new();

    for device in devices {
        let i = device.index;
        let link_count = match session.link_count(device) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("GPU {i}: could not read the NVLink count: {e}");
                continue;
            }
        };
        log::debug!("GPU {i}: {link_count} NVLinks");

        for link in 0..link_count {
            let (j, generation) = match probe_link(session, device, link, &locations) {
                Ok(Some(x)) => x,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("GPU {i} NVLink {link}: {e}");
                    continue;
                }
            };
            log::debug!("GPU {i} NVLink {link}: active to GPU {j}, generation {generation}");

            adjacency.set(i, j);
            adjacency.set(j, i);
            if seen.insert((i.min(j), i.max(j))) {
                let bw = Bandwidth::for_generation(generation);
                if !bw.is_known() {
                    log::warn!("GPU {i} NVLink {link}: unknown NVLink generation {generation}");
                }
                let c = Connection {
                    a: i,
                    b: j,
                    bandwidth: bw,
                    combined_mem: device.mem_total + devices[j].mem_total,
                };
                bandwidth.insert(c.pair(), bw);
                connections.push(c);
            }
        }
    }

    Topology {
        adjacency,
        connections,
        bandwidth,
    }
}

// Returns the remote device index and the link generation for an active link that resolves to
// another device, None for an inactive or unresolvable link.
fn probe_link(
    session: &dyn Session,
    device: &Device,
    link: LinkIndex,
    locations: &HashMap<&str, DeviceIndex>,
) -> Result<Option<(DeviceIndex, u32)>, InterfaceError> {
    if !session.link_active(device, link)? {
        return Ok(None);
    }
    let remote = session.link_remote(device, link)?;
    let j = match resolve(locations, &remote) {
        Some(j) if j != device.index => j,
        Some(_) => {
            log::debug!("GPU {} NVLink {link}: loops back to itself", device.index);
            return Ok(None);
        }
        None => {
            log::info!(
                "GPU {} NVLink {link}: remote {remote} is not an enumerated device",
                device.index
            );
            return Ok(None);
        }
    };
    let generation = session.link_generation(device, link)?;
    Ok(Some((j, generation)))
}

// Map each location to the first device that has it.
pub fn location_index(devices: &[Device]) -> HashMap<&str, DeviceIndex> {
    let mut m = HashMap::new();
    for d in devices {
        m.entry(d.location.as_str()).or_insert(d.index);
    }
    m
}

fn resolve(locations: &HashMap<&str, DeviceIndex>, remote: &Location) -> Option<DeviceIndex> {
    locations.get(remote.as_str()).copied()
}
