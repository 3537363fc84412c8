//! Leaf enums and small types shared across kinds.

use serde::{Deserialize, Serialize};

/// Hypervisor family backing a Provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    VSphere,
    Libvirt,
    Firecracker,
    Qemu,
    Proxmox,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::VSphere => "vsphere",
            ProviderType::Libvirt => "libvirt",
            ProviderType::Firecracker => "firecracker",
            ProviderType::Qemu => "qemu",
            ProviderType::Proxmox => "proxmox",
        }
    }
}

/// Desired VM power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Off,
    /// ACPI shutdown with a grace period before falling back to Off
    OffGraceful,
}

impl Default for PowerState {
    fn default() -> Self {
        Self::On
    }
}

/// Power state as observed from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedPowerState {
    On,
    Off,
    Unknown,
}

impl Default for ObservedPowerState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Qcow2,
    Raw,
    Vmdk,
    Vhd,
}

impl DiskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Raw => "raw",
            DiskFormat::Vmdk => "vmdk",
            DiskFormat::Vhd => "vhd",
        }
    }
}

impl Default for DiskFormat {
    fn default() -> Self {
        Self::Qcow2
    }
}

/// Disk device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Thin,
    Thick,
    EagerZeroedThick,
}

impl Default for DiskType {
    fn default() -> Self {
        Self::Thin
    }
}

/// Firmware type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Firmware {
    Bios,
    Uefi,
}

impl Default for Firmware {
    fn default() -> Self {
        Self::Bios
    }
}

/// Checksum algorithms accepted for image verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha512 => "sha512",
        }
    }
}

/// Clone strategies, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloneType {
    /// Independent copy of all disks
    Full,
    /// Copy-on-write against the source's disks
    Linked,
    /// Fork of a running VM including memory state
    Instant,
}

impl Default for CloneType {
    fn default() -> Self {
        Self::Full
    }
}

impl CloneType {
    /// Next weaker type in the downgrade chain Instant -> Linked -> Full.
    pub fn downgrade(&self) -> Option<CloneType> {
        match self {
            CloneType::Instant => Some(CloneType::Linked),
            CloneType::Linked => Some(CloneType::Full),
            CloneType::Full => None,
        }
    }
}

/// An integer count or a percentage string ("25%") of a total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i32),
    Percent(String),
}

impl Default for IntOrPercent {
    fn default() -> Self {
        Self::Int(1)
    }
}

impl IntOrPercent {
    /// Build a percentage value.
    pub fn percent(p: i32) -> Self {
        Self::Percent(format!("{p}%"))
    }

    /// Resolve against `total`, rounding up when `round_up` is set.
    ///
    /// Malformed percentage strings resolve to 0, matching a schema that
    /// should have rejected them upstream.
    pub fn resolve(&self, total: i32, round_up: bool) -> i32 {
        match self {
            IntOrPercent::Int(v) => (*v).max(0),
            IntOrPercent::Percent(s) => {
                let p: i64 = s
                    .trim_end_matches('%')
                    .parse::<i64>()
                    .unwrap_or(0)
                    .clamp(0, 100);
                let scaled = (total.max(0) as i64) * p;
                let resolved = if round_up {
                    (scaled + 99) / 100
                } else {
                    scaled / 100
                };
                resolved as i32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_downgrade_chain() {
        assert_eq!(CloneType::Instant.downgrade(), Some(CloneType::Linked));
        assert_eq!(CloneType::Linked.downgrade(), Some(CloneType::Full));
        assert_eq!(CloneType::Full.downgrade(), None);
    }

    #[test]
    fn test_int_or_percent_resolve() {
        assert_eq!(IntOrPercent::Int(2).resolve(5, false), 2);
        assert_eq!(IntOrPercent::percent(25).resolve(5, false), 1);
        assert_eq!(IntOrPercent::percent(25).resolve(5, true), 2);
        assert_eq!(IntOrPercent::percent(0).resolve(5, true), 0);
    }

    #[test]
    fn test_int_or_percent_serde_shapes() {
        let int: IntOrPercent = serde_json::from_str("3").unwrap();
        assert_eq!(int, IntOrPercent::Int(3));
        let pct: IntOrPercent = serde_json::from_str("\"25%\"").unwrap();
        assert_eq!(pct, IntOrPercent::percent(25));
    }
}
