// The top-level driver.  A run tries NVLink discovery first and, if that fails, falls back to a
// peer-access sweep.  Each attempt has its own session with the management interface, released
// before the next attempt starts.  There are no retries.

use crate::cluster::{self, Cluster};
use crate::fallback::{self, PeerAccess};
use crate::gpuapi::{self, Device, GpuAPI};
use crate::topology::{self, Topology};

#[derive(Default)]
pub struct ProbeOptions {
    pub json: bool,
    pub peer_access_only: bool,
    pub nvml_library: Option<String>,
}

pub enum Outcome {
    Topology {
        devices: Vec<Device>,
        topology: Topology,
        clusters: Vec<Cluster>,
    },
    PeerAccess {
        devices: Vec<Device>,
        pairs: Vec<PeerAccess>,
        // Why discovery was not used, None if it was not attempted
        reason: Option<String>,
    },
}

// Err is returned only if both attempts fail (or the one attempt, with `peer_access_only`).
pub fn run(api: &dyn GpuAPI, opts: &ProbeOptions) -> Result<Outcome, String> {
    let mut reason = None;
    if !opts.peer_access_only {
        match gpuapi::with_session(api, topology::discover) {
            Ok((devices, topology)) => {
                for ((a, b), bw) in &topology.bandwidth {
                    log::debug!("GPU {a} <-> GPU {b}: {bw}");
                }
                let clusters = cluster::find_clusters(&topology.adjacency, &devices);
                return Ok(Outcome::Topology {
                    devices,
                    topology,
                    clusters,
                });
            }
            Err(e) => {
                log::warn!("NVLink discovery failed: {e}");
                log::warn!("Retrying with peer access probing");
                reason = Some(e);
            }
        }
    }

    match gpuapi::with_session(api, fallback::probe) {
        Ok((devices, pairs)) => Ok(Outcome::PeerAccess {
            devices,
            pairs,
            reason,
        }),
        Err(e) => Err(match reason {
            Some(first) => {
                format!("NVLink discovery failed: {first}; peer access probing failed: {e}")
            }
            None => format!("Peer access probing failed: {e}"),
        }),
    }
}
