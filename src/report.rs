// Render the outcome of a run, either as a human-readable report or as a single JSON object.
//
// The JSON object always has "hostname", "method" ("nvlink" or "peer_access") and "devices".  For
// "nvlink" it then has "adjacency", "connections" and "clusters"; for "peer_access" it has
// "peer_access" and, if discovery was attempted and failed, "reason".  Memory sizes are in bytes.
// A connection whose NVLink generation is unknown has a null "bandwidth_gbps" and carries the
// generation in "unknown_generation".

use crate::cluster::Cluster;
use crate::fallback::PeerAccess;
use crate::gpuapi::Device;
use crate::output::{self, Array, Object, Value};
use crate::probe::Outcome;
use crate::topology::{Adjacency, Bandwidth, Connection};
use crate::util::gib;

use std::io;

pub fn write_text(
    writer: &mut dyn io::Write,
    hostname: &str,
    outcome: &Outcome,
) -> io::Result<()> {
    match outcome {
        Outcome::Topology {
            devices,
            topology,
            clusters,
        } => {
            write_devices(writer, hostname, devices)?;
            writeln!(writer)?;
            write_matrix(writer, &topology.adjacency)?;
            writeln!(writer)?;
            if topology.connections.is_empty() {
                writeln!(writer, "No NVLink connections found.")?;
                return Ok(());
            }
            writeln!(writer, "NVLink connections:")?;
            for c in &topology.connections {
                writeln!(
                    writer,
                    "GPU {} <-> GPU {} (bandwidth {}, combined memory {} GiB)",
                    c.a,
                    c.b,
                    c.bandwidth,
                    gib(c.combined_mem)
                )?;
            }
            if !clusters.is_empty() {
                writeln!(writer)?;
                writeln!(writer, "NVLink clusters:")?;
                for (k, cl) in clusters.iter().enumerate() {
                    let members = cl
                        .members
                        .iter()
                        .map(|m| format!("GPU {m}"))
                        .collect::<Vec<String>>()
                        .join(", ");
                    writeln!(
                        writer,
                        "Cluster {}: {members} (combined memory {} GiB)",
                        k + 1,
                        gib(cl.total_mem)
                    )?;
                }
            }
            Ok(())
        }
        Outcome::PeerAccess {
            devices,
            pairs,
            reason,
        } => {
            write_devices(writer, hostname, devices)?;
            writeln!(writer)?;
            if let Some(reason) = reason {
                writeln!(writer, "NVLink discovery failed: {reason}")?;
            }
            if pairs.is_empty() {
                writeln!(writer, "No GPU pairs with peer access found.")?;
                return Ok(());
            }
            writeln!(writer, "Peer access (an approximation of NVLink connectivity):")?;
            for p in pairs {
                writeln!(
                    writer,
                    "GPU {} -> GPU {} (combined memory {} GiB)",
                    p.from,
                    p.to,
                    gib(p.combined_mem)
                )?;
            }
            Ok(())
        }
    }
}

fn write_devices(
    writer: &mut dyn io::Write,
    hostname: &str,
    devices: &[Device],
) -> io::Result<()> {
    writeln!(writer, "Host {hostname}: {} GPUs", devices.len())?;
    for d in devices {
        writeln!(
            writer,
            "GPU {}: {} ({} GiB total, {} GiB used)",
            d.index,
            d.name,
            gib(d.mem_total),
            gib(d.mem_used)
        )?;
    }
    Ok(())
}

// One row per device, 1 where the row device links to the column device.
fn write_matrix(writer: &mut dyn io::Write, adjacency: &Adjacency) -> io::Result<()> {
    writeln!(writer, "NVLink matrix:")?;
    let mut header = "     ".to_string();
    for col in 0..adjacency.len() {
        header += &format!("{col:>3}");
    }
    writeln!(writer, "{header}")?;
    for row in 0..adjacency.len() {
        let mut line = format!("{row:>3} [");
        for col in 0..adjacency.len() {
            line += &format!("{:>3}", u8::from(adjacency.get(row, col)));
        }
        line += " ]";
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

pub fn write_json(
    writer: &mut dyn io::Write,
    hostname: &str,
    outcome: &Outcome,
) -> io::Result<()> {
    output::write_json(writer, &Value::O(json_report(hostname, outcome)))
}

pub fn json_report(hostname: &str, outcome: &Outcome) -> Object {
    let mut report = Object::new();
    report.push_s("hostname", hostname.to_string());
    match outcome {
        Outcome::Topology {
            devices,
            topology,
            clusters,
        } => {
            report.push_s("method", "nvlink".to_string());
            report.push_a("devices", json_devices(devices));
            let mut rows = Array::new();
            for cells in topology.adjacency.rows() {
                let mut row = Array::new();
                for cell in cells {
                    row.push_u(u64::from(*cell));
                }
                rows.push_a(row);
            }
            report.push_a("adjacency", rows);
            let mut connections = Array::new();
            for c in &topology.connections {
                connections.push_o(json_connection(c));
            }
            report.push_a("connections", connections);
            let mut cs = Array::new();
            for cl in clusters {
                cs.push_o(json_cluster(cl));
            }
            report.push_a("clusters", cs);
        }
        Outcome::PeerAccess {
            devices,
            pairs,
            reason,
        } => {
            report.push_s("method", "peer_access".to_string());
            if let Some(reason) = reason {
                report.push_s("reason", reason.clone());
            }
            report.push_a("devices", json_devices(devices));
            let mut ps = Array::new();
            for p in pairs {
                ps.push_o(json_peer_access(p));
            }
            report.push_a("peer_access", ps);
        }
    }
    report
}

fn json_devices(devices: &[Device]) -> Array {
    let mut a = Array::new();
    for d in devices {
        let mut o = Object::new();
        o.push_u("index", d.index as u64);
        o.push_s("name", d.name.clone());
        o.push_s("location", d.location.clone());
        o.push_u("mem_total", d.mem_total);
        o.push_u("mem_used", d.mem_used);
        a.push_o(o);
    }
    a
}

fn json_connection(c: &Connection) -> Object {
    let mut o = Object::new();
    o.push_u("a", c.a as u64);
    o.push_u("b", c.b as u64);
    match c.bandwidth {
        Bandwidth::Known(gbps) => o.push_u("bandwidth_gbps", gbps as u64),
        Bandwidth::Unknown { generation } => {
            o.push_n("bandwidth_gbps");
            o.push_u("unknown_generation", generation as u64);
        }
    }
    o.push_u("combined_mem", c.combined_mem);
    o
}

fn json_cluster(cl: &Cluster) -> Object {
    let mut members = Array::new();
    for m in &cl.members {
        members.push_u(*m as u64);
    }
    let mut o = Object::new();
    o.push_a("members", members);
    o.push_u("total_mem", cl.total_mem);
    o
}

fn json_peer_access(p: &PeerAccess) -> Object {
    let mut o = Object::new();
    o.push_u("from", p.from as u64);
    o.push_u("to", p.to as u64);
    o.push_u("combined_mem", p.combined_mem);
    o
}
