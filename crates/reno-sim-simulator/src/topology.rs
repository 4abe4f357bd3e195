use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;

use reno_sim_abstract::{LinkConfig, Packet, SimConfig, SimTime};
use serde::{Deserialize, Serialize};

pub const SENDER_NODE: u32 = 0;
pub const ROUTER_NODE: u32 = 1;
pub const SINK_NODE: u32 = 2;

pub const SINK_PORT: u16 = 9;
pub const SENDER_PORT: u16 = 49153;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub queue_drops: u64,
    pub loss_drops: u64,
}

/// Outcome of handing a packet to a device.
#[derive(Debug)]
pub enum Enqueue {
    /// The device was idle; the caller starts serializing this packet now.
    Transmit(Packet),
    Queued,
    Dropped,
}

/// One end of a point-to-point link with a drop-tail transmit queue.
#[derive(Debug)]
pub struct NetDevice {
    pub node: u32,
    /// Position among the devices of `node`.
    pub index: u32,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    /// Device at the other end of the link.
    pub peer: usize,
    pub data_rate_bps: u64,
    pub delay: SimTime,
    pub loss_rate: f64,
    queue: VecDeque<Packet>,
    queue_limit: usize,
    busy: bool,
    pub stats: DeviceStats,
}

impl NetDevice {
    /// Serialization time of `bytes` at this device's data rate, rounded up.
    pub fn tx_time(&self, bytes: u32) -> SimTime {
        let bits = (bytes as u128) * 8;
        let rate = self.data_rate_bps.max(1) as u128;
        let nanos = (bits * 1_000_000_000 + rate - 1) / rate;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn enqueue(&mut self, packet: Packet) -> Enqueue {
        if !self.busy {
            self.busy = true;
            return Enqueue::Transmit(packet);
        }
        if self.queue.len() >= self.queue_limit {
            self.stats.queue_drops += 1;
            return Enqueue::Dropped;
        }
        self.queue.push_back(packet);
        Enqueue::Queued
    }

    /// Called when the current frame has left the device. Returns the next
    /// frame to serialize, if any; the device stays busy in that case.
    pub fn transmission_complete(&mut self) -> Option<Packet> {
        let next = self.queue.pop_front();
        self.busy = next.is_some();
        next
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_subnet(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::MAX.checked_shl(32 - self.prefix_len as u32).unwrap_or(0);
        u32::from(addr) & mask == u32::from(self.address) & mask
    }
}

#[derive(Debug, Clone)]
struct Route {
    network: Ipv4Addr,
    prefix_len: u8,
    device: usize,
}

impl Route {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::MAX.checked_shl(32 - self.prefix_len as u32).unwrap_or(0);
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

#[derive(Debug, Default)]
pub struct Node {
    pub id: u32,
    pub devices: Vec<usize>,
    routes: Vec<Route>,
}

/// Nodes, devices and static routes of the simulated network.
#[derive(Debug, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub devices: Vec<NetDevice>,
}

impl Topology {
    /// n0 --access-- n1 --bottleneck-- n2, addressed 10.1.1.0/24 and 10.1.2.0/24.
    pub fn three_node_chain(config: &SimConfig) -> Self {
        let mut topology = Topology::default();
        let n0 = topology.add_node();
        let n1 = topology.add_node();
        let n2 = topology.add_node();
        topology.connect(n0, n1, &config.access_link, Ipv4Addr::new(10, 1, 1, 0));
        topology.connect(n1, n2, &config.bottleneck_link, Ipv4Addr::new(10, 1, 2, 0));
        topology.populate_routes();
        topology
    }

    pub fn add_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            id,
            ..Default::default()
        });
        id
    }

    /// Install a point-to-point link between `a` and `b` and number its two
    /// ends .1 and .2 within the /24 `network`.
    pub fn connect(&mut self, a: u32, b: u32, link: &LinkConfig, network: Ipv4Addr) {
        let base = u32::from(network);
        let first = self.devices.len();
        for (offset, node) in [a, b].into_iter().enumerate() {
            let index = self.nodes[node as usize].devices.len() as u32;
            self.devices.push(NetDevice {
                node,
                index,
                address: Ipv4Addr::from(base + offset as u32 + 1),
                prefix_len: 24,
                peer: first + 1 - offset,
                data_rate_bps: link.data_rate_bps,
                delay: link.delay(),
                loss_rate: link.loss_rate,
                queue: VecDeque::new(),
                queue_limit: link.queue_packets,
                busy: false,
                stats: DeviceStats::default(),
            });
            self.nodes[node as usize].devices.push(first + offset);
        }
    }

    /// Shortest-path routes from every node to every connected subnet.
    pub fn populate_routes(&mut self) {
        let subnets: Vec<(Ipv4Addr, u8, u32)> = self
            .devices
            .iter()
            .map(|dev| {
                let mask = u32::MAX.checked_shl(32 - dev.prefix_len as u32).unwrap_or(0);
                (
                    Ipv4Addr::from(u32::from(dev.address) & mask),
                    dev.prefix_len,
                    dev.node,
                )
            })
            .collect();

        for node in 0..self.nodes.len() {
            let first_hops = self.first_hops_from(node as u32);
            let mut routes = Vec::new();
            for &(network, prefix_len, owner) in &subnets {
                if routes
                    .iter()
                    .any(|r: &Route| r.network == network && r.prefix_len == prefix_len)
                {
                    continue;
                }
                let device = self.nodes[node].devices.iter().copied().find(|&d| {
                    let dev = &self.devices[d];
                    dev.in_subnet(network)
                });
                let device = device.or(first_hops[owner as usize]);
                if let Some(device) = device {
                    routes.push(Route {
                        network,
                        prefix_len,
                        device,
                    });
                }
            }
            self.nodes[node].routes = routes;
        }
    }

    /// For each destination node, the local device on a shortest path to it.
    fn first_hops_from(&self, source: u32) -> Vec<Option<usize>> {
        let mut first_hop = vec![None; self.nodes.len()];
        let mut seen = HashSet::from([source]);
        let mut frontier = VecDeque::new();
        for &dev in &self.nodes[source as usize].devices {
            let neighbour = self.devices[self.devices[dev].peer].node;
            if seen.insert(neighbour) {
                first_hop[neighbour as usize] = Some(dev);
                frontier.push_back(neighbour);
            }
        }
        while let Some(node) = frontier.pop_front() {
            for &dev in &self.nodes[node as usize].devices {
                let neighbour = self.devices[self.devices[dev].peer].node;
                if seen.insert(neighbour) {
                    first_hop[neighbour as usize] = first_hop[node as usize];
                    frontier.push_back(neighbour);
                }
            }
        }
        first_hop
    }

    /// Outgoing device on `node` for packets addressed to `dst`.
    pub fn route(&self, node: u32, dst: Ipv4Addr) -> Option<usize> {
        self.nodes
            .get(node as usize)?
            .routes
            .iter()
            .filter(|r| r.matches(dst))
            .max_by_key(|r| r.prefix_len)
            .map(|r| r.device)
    }

    pub fn owns_address(&self, node: u32, addr: Ipv4Addr) -> bool {
        self.nodes.get(node as usize).is_some_and(|n| {
            n.devices
                .iter()
                .any(|&d| self.devices[d].address == addr)
        })
    }

    /// Address of the first device of `node`.
    pub fn address_of(&self, node: u32) -> Option<Ipv4Addr> {
        let node = self.nodes.get(node as usize)?;
        node.devices.first().map(|&d| self.devices[d].address)
    }
}
