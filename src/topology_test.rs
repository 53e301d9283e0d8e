use crate::gpuapi::GpuAPI;
use crate::mockgpu::{location_of, MockGpuAPI, MockLink, GIB};
use crate::topology::{self, Bandwidth, Connection};

use std::collections::BTreeMap;

#[test]
pub fn bandwidth_table_test() {
    assert!(Bandwidth::for_generation(1) == Bandwidth::Known(20));
    assert!(Bandwidth::for_generation(2) == Bandwidth::Known(25));
    assert!(Bandwidth::for_generation(3) == Bandwidth::Known(50));
    assert!(Bandwidth::for_generation(4) == Bandwidth::Known(100));
    for g in [0, 5, 17] {
        let bw = Bandwidth::for_generation(g);
        assert!(bw == Bandwidth::Unknown { generation: g });
        assert!(bw.gbps() == 0);
        assert!(!bw.is_known());
    }
    // Pure
    assert!(Bandwidth::for_generation(3) == Bandwidth::for_generation(3));
    assert!(Bandwidth::for_generation(3).gbps() == 50);
}

#[test]
pub fn bandwidth_display_test() {
    assert!(Bandwidth::Known(50).to_string() == "50 GB/s");
    assert!(Bandwidth::Unknown { generation: 7 }.to_string() == "unknown (NVLink generation 7)");
}

// Four devices; 0-1 reported from both ends, 2-3 from one end only, 4 isolated.
#[test]
pub fn discover_dedup_test() {
    let api = MockGpuAPI::new()
        .with_devices(5, "Yoyodyne 1", 16 * GIB)
        .with_link(0, 1, 3)
        .with_link(1, 0, 3)
        .with_link(2, 3, 2);
    let session = api.open().unwrap();
    let (devices, topo) = topology::discover(session.as_ref()).unwrap();
    session.close().unwrap();

    assert!(devices.len() == 5);
    assert!(
        topo.connections
            == vec![
                Connection {
                    a: 0,
                    b: 1,
                    bandwidth: Bandwidth::Known(50),
                    combined_mem: 32 * GIB,
                },
                Connection {
                    a: 2,
                    b: 3,
                    bandwidth: Bandwidth::Known(25),
                    combined_mem: 32 * GIB,
                },
            ]
    );
    let mut expect = BTreeMap::new();
    expect.insert((0, 1), Bandwidth::Known(50));
    expect.insert((2, 3), Bandwidth::Known(25));
    assert!(topo.bandwidth == expect);

    // Symmetric even though 3 never reported its link to 2.
    for i in 0..5 {
        for j in 0..5 {
            assert!(topo.adjacency.get(i, j) == topo.adjacency.get(j, i));
        }
    }
    assert!(topo.adjacency.get(0, 1));
    assert!(topo.adjacency.get(3, 2));
    assert!(!topo.adjacency.get(0, 2));
    for j in 0..5 {
        assert!(!topo.adjacency.get(4, j));
        assert!(!topo.adjacency.get(j, j));
    }
}

// Several parallel links between the same two devices still give one connection.
#[test]
pub fn discover_parallel_links_test() {
    let api = MockGpuAPI::new()
        .with_devices(2, "Yoyodyne 1", GIB)
        .with_nvlink(0, 1, 4)
        .with_nvlink(0, 1, 4)
        .with_nvlink(0, 1, 4);
    let session = api.open().unwrap();
    let (_, topo) = topology::discover(session.as_ref()).unwrap();
    assert!(topo.connections.len() == 1);
    assert!(topo.connections[0].pair() == (0, 1));
    assert!(topo.connections[0].bandwidth.gbps() == 100);
}

#[test]
pub fn discover_unresolvable_remote_test() {
    let api = MockGpuAPI::new()
        .with_devices(2, "Yoyodyne 1", GIB)
        .with_raw_link(
            0,
            MockLink::Active {
                remote: "0000:C4:00.0".to_string(),
                generation: 3,
            },
        )
        // A link that comes back to the device itself is not a connection either.
        .with_link(1, 1, 3);
    let session = api.open().unwrap();
    let (_, topo) = topology::discover(session.as_ref()).unwrap();
    assert!(topo.connections.is_empty());
    assert!(topo.bandwidth.is_empty());
    assert!(!topo.adjacency.get(0, 1) && !topo.adjacency.get(1, 1));
}

// Failures on one link don't stop the others from being read.
#[test]
pub fn discover_link_failures_test() {
    let api = MockGpuAPI::new()
        .with_devices(4, "Yoyodyne 1", GIB)
        .with_raw_link(0, MockLink::FailStatus)
        .with_raw_link(0, MockLink::FailRemote)
        .with_raw_link(
            0,
            MockLink::FailGeneration {
                remote: location_of(3),
            },
        )
        .with_raw_link(0, MockLink::Inactive)
        .with_link(0, 1, 1)
        .with_failing_link_count(2)
        .with_link(2, 3, 2)
        .with_link(3, 1, 2);
    let session = api.open().unwrap();
    let (_, topo) = topology::discover(session.as_ref()).unwrap();
    let pairs = topo
        .connections
        .iter()
        .map(|c| c.pair())
        .collect::<Vec<_>>();
    assert!(pairs == vec![(0, 1), (3, 1)]);
    assert!(!topo.adjacency.get(0, 3));
    assert!(!topo.adjacency.get(2, 3));
}

#[test]
pub fn discover_unknown_generation_test() {
    let api = MockGpuAPI::new()
        .with_devices(2, "Yoyodyne 2", 8 * GIB)
        .with_nvlink(0, 1, 9);
    let session = api.open().unwrap();
    let (_, topo) = topology::discover(session.as_ref()).unwrap();
    assert!(topo.connections.len() == 1);
    assert!(topo.connections[0].bandwidth == Bandwidth::Unknown { generation: 9 });
    assert!(topo.adjacency.get(0, 1));
}

#[test]
pub fn discover_enumeration_failure_test() {
    let api = MockGpuAPI::new()
        .with_devices(2, "Yoyodyne 1", GIB)
        .with_nvlink(0, 1, 3)
        .with_failing_enumerations(1);
    let session = api.open().unwrap();
    assert!(topology::discover(session.as_ref()).is_err());
}

#[test]
pub fn combined_memory_test() {
    let api = MockGpuAPI::new()
        .with_device("Yoyodyne 1", 3 * GIB)
        .with_device("Yoyodyne 2", 5 * GIB + 17)
        .with_link(1, 0, 2);
    let session = api.open().unwrap();
    let (_, topo) = topology::discover(session.as_ref()).unwrap();
    assert!(topo.connections[0].pair() == (1, 0));
    assert!(topo.connections[0].combined_mem == 8 * GIB + 17);
}

// First device with the location wins.
#[test]
pub fn location_index_test() {
    let mut devices = MockGpuAPI::new()
        .with_devices(3, "Yoyodyne 1", GIB)
        .devices()
        .to_vec();
    devices[2].location = devices[1].location.clone();
    let m = topology::location_index(&devices);
    assert!(m.len() == 2);
    assert!(m[location_of(1).as_str()] == 1);
}
