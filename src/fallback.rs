// Peer-access sweep, used when topology discovery fails.
//
// Peer access says that one device can address another's memory directly.  That is a weaker
// property than an NVLink between them (it can hold over PCIe), so this is only an approximation of
// the topology.  The capability is not guaranteed to be symmetric, so both directions of every pair
// are probed and reported independently.

use crate::gpuapi::{Device, Session};
use crate::types::DeviceIndex;

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct PeerAccess {
    pub from: DeviceIndex,
    pub to: DeviceIndex,
    pub combined_mem: u64, // bytes
}

pub fn probe(session: &dyn Session) -> Result<(Vec<Device>, Vec<PeerAccess>), String> {
    let devices = session
        .enumerate_devices()
        .map_err(|e| format!("Device enumeration failed: {e}"))?;
    let pairs = peer_access_pairs(session, &devices);
    Ok((devices, pairs))
}

// A failing probe is logged and the pair is taken to be inaccessible.
pub fn peer_access_pairs(session: &dyn Session, devices: &[Device]) -> Vec<PeerAccess> {
    let mut result = vec![];
    for from in devices {
        for to in devices {
            if from.index == to.index {
                continue;
            }
            match session.peer_access(from, to) {
                Ok(true) => result.push(PeerAccess {
                    from: from.index,
                    to: to.index,
                    combined_mem: from.mem_total + to.mem_total,
                }),
                Ok(false) => {}
                Err(e) => {
                    log::warn!(
                        "GPU {} -> GPU {}: peer access probe failed: {e}",
                        from.index,
                        to.index
                    );
                }
            }
        }
    }
    result
}
