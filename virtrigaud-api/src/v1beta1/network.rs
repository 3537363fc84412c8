//! The VMNetworkAttachment kind: a provider-agnostic network description.

use serde::{Deserialize, Serialize};

use virtrigaud_common::conditions::Condition;

use crate::impl_object;
use crate::meta::ObjectMeta;

/// A network VMs can attach to, with per-provider realizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMNetworkAttachment {
    pub metadata: ObjectMeta,
    pub spec: VMNetworkAttachmentSpec,
    #[serde(default)]
    pub status: VMNetworkAttachmentStatus,
}

impl_object!(VMNetworkAttachment, "VMNetworkAttachment");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMNetworkAttachmentSpec {
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<VSphereNetwork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libvirt: Option<LibvirtNetwork>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxmox: Option<ProxmoxNetwork>,
    #[serde(default)]
    pub ip_allocation: IpAllocation,
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<QosSpec>,
}

/// Topology of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Bridged,
    Nat,
    Isolated,
    HostOnly,
    External,
}

/// vSphere-specific realization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VSphereNetwork {
    pub portgroup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
}

/// libvirt-specific realization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibvirtNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Proxmox-specific realization (`vmbrN` bridges).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxmoxNetwork {
    pub bridge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    pub firewall: bool,
}

/// How addresses are assigned on this network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpAllocation {
    #[serde(rename = "type")]
    pub allocation_type: IpAllocationType,
    /// Static addresses in CIDR form, used when type is Static
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
    /// Pool range "10.0.0.10-10.0.0.99", used when type is Pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IpAllocationType {
    Dhcp,
    Static,
    Pool,
    None,
}

impl Default for IpAllocationType {
    fn default() -> Self {
        Self::Dhcp
    }
}

/// A firewall rule applied at the attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub direction: FirewallDirection,
    /// "tcp", "udp", "icmp" or "any"
    pub protocol: String,
    /// Ports or ranges, e.g. "443", "8000-8999"
    #[serde(default)]
    pub ports: Vec<String>,
    /// Source CIDRs (ingress) or destination CIDRs (egress)
    #[serde(default)]
    pub peers: Vec<String>,
    pub action: FirewallAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallDirection {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Allow,
    Deny,
}

/// Traffic shaping limits in megabits per second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QosSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_mbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_mbps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VMNetworkAttachmentStatus {
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}
