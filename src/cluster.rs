// Partition the linked devices into clusters: maximal groups of two or more devices that can reach
// each other over NVLink.  Devices without any link are not in any cluster.
//
// Clusters are found by breadth-first search from each not-yet-visited device in index order, so
// they come out ordered by their lowest member, and members within a cluster come out in visiting
// order.  The adjacency relation is treated as undirected.

use crate::gpuapi::Device;
use crate::topology::Adjacency;
use crate::types::DeviceIndex;

use std::collections::VecDeque;

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Cluster {
    pub members: Vec<DeviceIndex>,
    pub total_mem: u64, // bytes
}

pub fn find_clusters(adjacency: &Adjacency, devices: &[Device]) -> Vec<Cluster> {
    components(adjacency)
        .into_iter()
        .map(|members| {
            let total_mem = members.iter().map(|m| devices[*m].mem_total).sum();
            Cluster { members, total_mem }
        })
        .collect()
}

// The connected components of size > 1.
pub fn components(adjacency: &Adjacency) -> Vec<Vec<DeviceIndex>> {
    let n = adjacency.len();
    let mut visited = vec![false; n];
    let mut result = vec![];

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        let mut group = vec![];
        let mut queue = VecDeque::from([seed]);
        visited[seed] = true;
        while let Some(node) = queue.pop_front() {
            group.push(node);
            for next in 0..n {
                if !visited[next] && adjacency.linked(node, next) {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if group.len() > 1 {
            result.push(group);
        }
    }

    result
}
