//! Conversion between `v1alpha1` and the `v1beta1` hub.
//!
//! Every kind designates `v1beta1` as its hub; `v1alpha1` converts through
//! it. Fields that only exist in beta are preserved across a round trip by
//! stashing the full hub object in an annotation on the alpha form, so
//! `beta -> alpha -> beta` is lossless as long as the object never leaves
//! the system. When an alpha object arrives without a stash (created by an
//! old client), hub fields default.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::meta::{LocalObjectReference, ObjectMeta, ObjectRef};
use crate::v1alpha1;
use crate::v1beta1;

/// Annotation carrying the stashed hub object on alpha forms.
pub const CONVERSION_DATA_ANNOTATION: &str = "virtrigaud.io/conversion-data";

/// Conversion failures.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("conversion stash is corrupt: {0}")]
    CorruptStash(#[from] serde_json::Error),
}

/// Conversion between a spoke version and its hub.
pub trait Convert: Sized {
    type Hub;

    fn to_hub(self) -> Result<Self::Hub, ConversionError>;
    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError>;
}

/// Stash `hub` into `meta`'s conversion annotation.
fn stash<H: Serialize>(meta: &mut ObjectMeta, hub: &H) -> Result<(), ConversionError> {
    let encoded = serde_json::to_string(hub)?;
    meta.annotations
        .insert(CONVERSION_DATA_ANNOTATION.to_string(), encoded);
    Ok(())
}

/// Pop and decode the stashed hub from `meta`, if present.
fn unstash<H: DeserializeOwned>(meta: &mut ObjectMeta) -> Result<Option<H>, ConversionError> {
    match meta.annotations.remove(CONVERSION_DATA_ANNOTATION) {
        Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
        None => Ok(None),
    }
}

// =============================================================================
// VIRTUALMACHINE
// =============================================================================

impl Convert for v1alpha1::VirtualMachine {
    type Hub = v1beta1::VirtualMachine;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VirtualMachine> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VirtualMachine {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VirtualMachineSpec::default(),
            status: v1beta1::VirtualMachineStatus::default(),
        });

        // Metadata is authoritative on the incoming object.
        hub.metadata = self.metadata;

        hub.spec.provider_ref = ObjectRef::new(self.spec.provider);
        hub.spec.class_ref = LocalObjectReference::new(self.spec.class);
        if let Some(image) = self.spec.image {
            hub.spec.image_ref = Some(LocalObjectReference::new(image));
            hub.spec.imported_disk = None;
        }
        // Keep beta-only per-network fields for unchanged attachments.
        let networks: Vec<v1beta1::VmNetworkRef> = self
            .spec
            .networks
            .into_iter()
            .map(|name| {
                hub.spec
                    .networks
                    .iter()
                    .find(|n| n.name == name)
                    .cloned()
                    .unwrap_or(v1beta1::VmNetworkRef {
                        name,
                        ..Default::default()
                    })
            })
            .collect();
        hub.spec.networks = networks;
        hub.spec.power_state = match self.spec.power_state {
            v1alpha1::AlphaPowerState::On => v1beta1::PowerState::On,
            // Alpha cannot express OffGraceful; keep the stashed intent.
            v1alpha1::AlphaPowerState::Off => {
                if hub.spec.power_state == v1beta1::PowerState::OffGraceful {
                    v1beta1::PowerState::OffGraceful
                } else {
                    v1beta1::PowerState::Off
                }
            }
        };
        if let Some(user_data) = self.spec.user_data {
            hub.spec.user_data = Some(v1beta1::UserData::CloudInit {
                inline: Some(user_data),
                secret_ref: None,
            });
        }
        hub.spec.placement_ref = self.spec.placement_policy.map(LocalObjectReference::new);
        hub.spec.tags = self.spec.tags;

        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;

        let user_data = match &hub.spec.user_data {
            Some(v1beta1::UserData::CloudInit { inline, .. }) => inline.clone(),
            _ => None,
        };

        Ok(Self {
            metadata,
            spec: v1alpha1::VirtualMachineSpec {
                provider: hub.spec.provider_ref.name.clone(),
                class: hub.spec.class_ref.name.clone(),
                image: hub.spec.image_ref.as_ref().map(|r| r.name.clone()),
                networks: hub.spec.networks.iter().map(|n| n.name.clone()).collect(),
                power_state: match hub.spec.power_state {
                    v1beta1::PowerState::On => v1alpha1::AlphaPowerState::On,
                    v1beta1::PowerState::Off | v1beta1::PowerState::OffGraceful => {
                        v1alpha1::AlphaPowerState::Off
                    }
                },
                user_data,
                placement_policy: hub.spec.placement_ref.as_ref().map(|r| r.name.clone()),
                tags: hub.spec.tags.clone(),
            },
            status: v1alpha1::VirtualMachineStatus {
                id: hub.status.id.clone(),
                phase: format!("{:?}", hub.status.phase),
                power_state: format!("{:?}", hub.status.power_state),
                ips: hub.status.ips.clone(),
                message: virtrigaud_common::conditions::get_condition(
                    &hub.status.conditions,
                    virtrigaud_common::conditions::types::READY,
                )
                .and_then(|c| c.message.clone()),
            },
        })
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

impl Convert for v1alpha1::Provider {
    type Hub = v1beta1::Provider;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::Provider> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::Provider {
            metadata: ObjectMeta::default(),
            spec: v1beta1::ProviderSpec {
                provider_type: self.spec.provider_type,
                endpoint: String::new(),
                credential_secret_ref: None,
                runtime: None,
                health_check: Default::default(),
                connection_pool: Default::default(),
            },
            status: v1beta1::ProviderStatus::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.provider_type = self.spec.provider_type;
        hub.spec.endpoint = self.spec.endpoint;
        hub.spec.credential_secret_ref =
            self.spec.credential_secret.map(LocalObjectReference::new);
        if let Some(image) = self.spec.runtime_image {
            let runtime = hub.spec.runtime.get_or_insert_with(Default::default);
            runtime.image = image;
            if let Some(replicas) = self.spec.replicas {
                runtime.replicas = replicas;
            }
        }

        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;

        Ok(Self {
            metadata,
            spec: v1alpha1::ProviderSpec {
                provider_type: hub.spec.provider_type,
                endpoint: hub.spec.endpoint.clone(),
                credential_secret: hub
                    .spec
                    .credential_secret_ref
                    .as_ref()
                    .map(|r| r.name.clone()),
                runtime_image: hub
                    .spec
                    .runtime
                    .as_ref()
                    .filter(|r| !r.image.is_empty())
                    .map(|r| r.image.clone()),
                replicas: hub.spec.runtime.as_ref().map(|r| r.replicas),
            },
            status: v1alpha1::ProviderStatus {
                healthy: hub.status.healthy,
                message: hub.status.message.clone(),
            },
        })
    }
}

// =============================================================================
// VMCLASS
// =============================================================================

impl Convert for v1alpha1::VMClass {
    type Hub = v1beta1::VMClass;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMClass> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMClass {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMClassSpec {
                cpu: 1,
                memory: "128Mi".to_string(),
                firmware: Default::default(),
                disk_defaults: None,
                guest_tools: Default::default(),
                performance_profile: None,
                security_profile: None,
                extra_config: Default::default(),
            },
        });

        hub.metadata = self.metadata;
        hub.spec.cpu = self.spec.cpu;
        // Only rewrite the quantity when the MiB value actually changed, so
        // an untouched "8Gi" survives the round trip verbatim.
        let stashed_mib = virtrigaud_common::quantity::parse_quantity(&hub.spec.memory)
            .map(|b| b >> 20)
            .unwrap_or(0);
        if stashed_mib != self.spec.memory_mib {
            hub.spec.memory = format!("{}Mi", self.spec.memory_mib);
        }
        hub.spec.firmware = self.spec.firmware;
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        let memory_mib = virtrigaud_common::quantity::parse_quantity(&hub.spec.memory)
            .map(|b| b >> 20)
            .unwrap_or(0);
        Ok(Self {
            metadata,
            spec: v1alpha1::VMClassSpec {
                cpu: hub.spec.cpu,
                memory_mib,
                firmware: hub.spec.firmware,
            },
        })
    }
}

// =============================================================================
// VMIMAGE
// =============================================================================

impl Convert for v1alpha1::VMImage {
    type Hub = v1beta1::VMImage;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMImage> = unstash(&mut self.metadata)?;
        let source = if let Some(url) = self.spec.url.clone() {
            v1beta1::ImageSource::Http {
                url,
                auth_secret_ref: None,
            }
        } else if let Some(template) = self.spec.template.clone() {
            v1beta1::ImageSource::VSphere {
                template: Some(template),
                content_library: None,
            }
        } else if let Some(hub) = &stashed {
            hub.spec.source.clone()
        } else {
            v1beta1::ImageSource::Http {
                url: String::new(),
                auth_secret_ref: None,
            }
        };

        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMImage {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMImageSpec {
                source: source.clone(),
                prepare: Default::default(),
            },
            status: Default::default(),
        });
        hub.metadata = self.metadata;
        hub.spec.source = source;
        hub.spec.prepare.checksum = self.spec.checksum;
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        let (url, template) = match &hub.spec.source {
            v1beta1::ImageSource::Http { url, .. } => (Some(url.clone()), None),
            v1beta1::ImageSource::VSphere { template, .. } => (None, template.clone()),
            _ => (None, None),
        };
        Ok(Self {
            metadata,
            spec: v1alpha1::VMImageSpec {
                url,
                template,
                checksum: hub.spec.prepare.checksum.clone(),
            },
            status: v1alpha1::VMImageStatus {
                ready: hub.status.phase == v1beta1::ImagePhase::Ready,
                message: hub.status.message.clone(),
            },
        })
    }
}

// =============================================================================
// VMNETWORKATTACHMENT
// =============================================================================

impl Convert for v1alpha1::VMNetworkAttachment {
    type Hub = v1beta1::VMNetworkAttachment;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMNetworkAttachment> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMNetworkAttachment {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMNetworkAttachmentSpec {
                network_type: self.spec.network_type,
                mtu: None,
                vsphere: None,
                libvirt: None,
                proxmox: None,
                ip_allocation: Default::default(),
                firewall_rules: Vec::new(),
                qos: None,
            },
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.network_type = self.spec.network_type;
        hub.spec.mtu = self.spec.mtu;
        if let Some(bridge) = self.spec.bridge {
            let libvirt = hub.spec.libvirt.get_or_insert_with(Default::default);
            libvirt.bridge = Some(bridge);
        }
        if let Some(vlan) = self.spec.vlan {
            let vsphere = hub.spec.vsphere.get_or_insert_with(Default::default);
            vsphere.vlan = Some(vlan);
        }
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        Ok(Self {
            metadata,
            spec: v1alpha1::VMNetworkAttachmentSpec {
                network_type: hub.spec.network_type,
                bridge: hub.spec.libvirt.as_ref().and_then(|l| l.bridge.clone()),
                vlan: hub.spec.vsphere.as_ref().and_then(|v| v.vlan),
                mtu: hub.spec.mtu,
            },
        })
    }
}

// =============================================================================
// VMPLACEMENTPOLICY
// =============================================================================

impl Convert for v1alpha1::VMPlacementPolicy {
    type Hub = v1beta1::VMPlacementPolicy;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMPlacementPolicy> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMPlacementPolicy {
            metadata: ObjectMeta::default(),
            spec: Default::default(),
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        let hard = hub.spec.hard.get_or_insert_with(Default::default);
        hard.allowed_hosts = self.spec.allowed_hosts;
        hard.denied_hosts = self.spec.denied_hosts;
        hard.allowed_datastores = self.spec.allowed_datastores;
        hard.denied_datastores = self.spec.denied_datastores;
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        let hard = hub.spec.hard.clone().unwrap_or_default();
        Ok(Self {
            metadata,
            spec: v1alpha1::VMPlacementPolicySpec {
                allowed_hosts: hard.allowed_hosts,
                denied_hosts: hard.denied_hosts,
                allowed_datastores: hard.allowed_datastores,
                denied_datastores: hard.denied_datastores,
            },
        })
    }
}

// =============================================================================
// VMSET
// =============================================================================

impl Convert for v1alpha1::VMSet {
    type Hub = v1beta1::VMSet;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMSet> = unstash(&mut self.metadata)?;
        let template_spec = v1alpha1::VirtualMachine {
            metadata: ObjectMeta::default(),
            spec: self.spec.template,
            status: Default::default(),
        }
        .to_hub()?
        .spec;

        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMSet {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMSetSpec {
                replicas: self.spec.replicas,
                selector: self.spec.selector.clone(),
                template: Default::default(),
                update_strategy: Default::default(),
                management_policy: Default::default(),
                pvc_retention: Default::default(),
                ordinals: Default::default(),
                volume_claim_templates: Vec::new(),
            },
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.replicas = self.spec.replicas;
        hub.spec.selector = self.spec.selector;
        hub.spec.template.spec = template_spec;
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        let template = v1alpha1::VirtualMachine::from_hub(&v1beta1::VirtualMachine {
            metadata: ObjectMeta::default(),
            spec: hub.spec.template.spec.clone(),
            status: Default::default(),
        })?;
        Ok(Self {
            metadata,
            spec: v1alpha1::VMSetSpec {
                replicas: hub.spec.replicas,
                selector: hub.spec.selector.clone(),
                template: template.spec,
            },
            status: v1alpha1::VMSetStatus {
                replicas: hub.status.replicas,
                ready_replicas: hub.status.ready_replicas,
            },
        })
    }
}

// =============================================================================
// VMSNAPSHOT
// =============================================================================

impl Convert for v1alpha1::VMSnapshot {
    type Hub = v1beta1::VMSnapshot;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMSnapshot> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMSnapshot {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMSnapshotSpec {
                vm_ref: LocalObjectReference::default(),
                config: Default::default(),
                retention: None,
                schedule: None,
                pinned: false,
            },
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.vm_ref = LocalObjectReference::new(self.spec.vm);
        hub.spec.config.include_memory = self.spec.include_memory;
        hub.spec.config.snapshot_type = self.spec.snapshot_type;
        if let Some(max_count) = self.spec.max_count {
            let retention = hub.spec.retention.get_or_insert_with(Default::default);
            retention.max_count = Some(max_count);
        }
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        Ok(Self {
            metadata,
            spec: v1alpha1::VMSnapshotSpec {
                vm: hub.spec.vm_ref.name.clone(),
                include_memory: hub.spec.config.include_memory,
                snapshot_type: hub.spec.config.snapshot_type,
                max_count: hub.spec.retention.as_ref().and_then(|r| r.max_count),
            },
            status: v1alpha1::VMSnapshotStatus {
                snapshot_id: hub.status.snapshot_id.clone(),
                phase: format!("{:?}", hub.status.phase),
            },
        })
    }
}

// =============================================================================
// VMCLONE
// =============================================================================

impl Convert for v1alpha1::VMClone {
    type Hub = v1beta1::VMClone;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMClone> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMClone {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMCloneSpec {
                source: v1beta1::CloneSource::Vm {
                    vm_ref: LocalObjectReference::default(),
                },
                target: Default::default(),
                options: Default::default(),
                customization: None,
            },
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.source = v1beta1::CloneSource::Vm {
            vm_ref: LocalObjectReference::new(self.spec.source_vm),
        };
        hub.spec.target.name = self.spec.target_name;
        hub.spec.options.clone_type = self.spec.clone_type;
        if let Some(hostname) = self.spec.hostname {
            let customization = hub.spec.customization.get_or_insert_with(Default::default);
            customization.hostname = Some(hostname);
        }
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        let source_vm = match &hub.spec.source {
            v1beta1::CloneSource::Vm { vm_ref } => vm_ref.name.clone(),
            _ => String::new(),
        };
        Ok(Self {
            metadata,
            spec: v1alpha1::VMCloneSpec {
                source_vm,
                target_name: hub.spec.target.name.clone(),
                clone_type: hub.spec.options.clone_type,
                hostname: hub
                    .spec
                    .customization
                    .as_ref()
                    .and_then(|c| c.hostname.clone()),
            },
            status: v1alpha1::VMCloneStatus {
                phase: format!("{:?}", hub.status.phase),
                message: hub.status.message.clone(),
            },
        })
    }
}

// =============================================================================
// VMMIGRATION
// =============================================================================

impl Convert for v1alpha1::VMMigration {
    type Hub = v1beta1::VMMigration;

    fn to_hub(mut self) -> Result<Self::Hub, ConversionError> {
        let stashed: Option<v1beta1::VMMigration> = unstash(&mut self.metadata)?;
        let mut hub = stashed.unwrap_or_else(|| v1beta1::VMMigration {
            metadata: ObjectMeta::default(),
            spec: v1beta1::VMMigrationSpec {
                source: Default::default(),
                target: Default::default(),
                options: Default::default(),
                storage: Default::default(),
            },
            status: Default::default(),
        });

        hub.metadata = self.metadata;
        hub.spec.source.vm_ref = ObjectRef::new(self.spec.vm);
        hub.spec.source.delete_after = self.spec.delete_source;
        hub.spec.target.provider_ref = ObjectRef::new(self.spec.target_provider);
        hub.spec.target.name = self.spec.target_name;
        hub.spec.options.disk_format = self.spec.disk_format;
        Ok(hub)
    }

    fn from_hub(hub: &Self::Hub) -> Result<Self, ConversionError> {
        let mut metadata = hub.metadata.clone();
        stash(&mut metadata, hub)?;
        Ok(Self {
            metadata,
            spec: v1alpha1::VMMigrationSpec {
                vm: hub.spec.source.vm_ref.name.clone(),
                target_provider: hub.spec.target.provider_ref.name.clone(),
                target_name: hub.spec.target.name.clone(),
                disk_format: hub.spec.options.disk_format,
                delete_source: hub.spec.source.delete_after,
            },
            status: v1alpha1::VMMigrationStatus {
                phase: hub.status.phase.as_str().to_string(),
                message: hub.status.message.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beta_vm() -> v1beta1::VirtualMachine {
        v1beta1::VirtualMachine {
            metadata: ObjectMeta::named("default", "web-01"),
            spec: v1beta1::VirtualMachineSpec {
                provider_ref: ObjectRef::new("vsphere-prod"),
                class_ref: LocalObjectReference::new("medium"),
                image_ref: Some(LocalObjectReference::new("ubuntu-22")),
                networks: vec![v1beta1::VmNetworkRef {
                    name: "app-net".to_string(),
                    ip_address: Some("10.0.0.10/24".to_string()),
                    mac_address: None,
                }],
                power_state: v1beta1::PowerState::OffGraceful,
                lifecycle: Some(v1beta1::LifecycleHooks {
                    pre_stop: vec!["sync".to_string()],
                    post_start: Vec::new(),
                }),
                ..Default::default()
            },
            status: Default::default(),
        }
    }

    #[test]
    fn test_vm_beta_alpha_beta_roundtrip_is_lossless() {
        let original = beta_vm();
        let alpha = v1alpha1::VirtualMachine::from_hub(&original).unwrap();
        // Alpha cannot express these; they survive via the stash.
        assert_eq!(alpha.spec.power_state, v1alpha1::AlphaPowerState::Off);
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_vm_alpha_edit_wins_over_stash() {
        let original = beta_vm();
        let mut alpha = v1alpha1::VirtualMachine::from_hub(&original).unwrap();
        alpha.spec.class = "large".to_string();
        alpha.spec.power_state = v1alpha1::AlphaPowerState::On;
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored.spec.class_ref.name, "large");
        assert_eq!(restored.spec.power_state, v1beta1::PowerState::On);
        // Untouched beta-only fields still restored.
        assert!(restored.spec.lifecycle.is_some());
        assert_eq!(
            restored.spec.networks[0].ip_address.as_deref(),
            Some("10.0.0.10/24")
        );
    }

    #[test]
    fn test_vm_alpha_without_stash_gets_defaults() {
        let alpha = v1alpha1::VirtualMachine {
            metadata: ObjectMeta::named("default", "legacy"),
            spec: v1alpha1::VirtualMachineSpec {
                provider: "libvirt-lab".to_string(),
                class: "small".to_string(),
                image: Some("debian-12".to_string()),
                ..Default::default()
            },
            status: Default::default(),
        };
        let hub = alpha.to_hub().unwrap();
        assert_eq!(hub.spec.provider_ref.name, "libvirt-lab");
        assert!(hub.spec.imported_disk.is_none());
        assert_eq!(hub.spec.power_state, v1beta1::PowerState::On);
    }

    #[test]
    fn test_provider_roundtrip() {
        let original = v1beta1::Provider {
            metadata: ObjectMeta::named("virtrigaud-system", "pve-1"),
            spec: v1beta1::ProviderSpec {
                provider_type: v1beta1::ProviderType::Proxmox,
                endpoint: "https://pve.example.com:8006".to_string(),
                credential_secret_ref: Some(LocalObjectReference::new("pve-creds")),
                runtime: Some(v1beta1::ProviderRuntimeSpec {
                    image: "ghcr.io/virtrigaud/provider-proxmox:0.3.2".to_string(),
                    replicas: 2,
                    ..Default::default()
                }),
                health_check: Default::default(),
                connection_pool: Default::default(),
            },
            status: Default::default(),
        };
        let alpha = v1alpha1::Provider::from_hub(&original).unwrap();
        assert_eq!(alpha.spec.replicas, Some(2));
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_migration_roundtrip() {
        let mut original = v1beta1::VMMigration {
            metadata: ObjectMeta::named("default", "move-web-01"),
            spec: v1beta1::VMMigrationSpec {
                source: v1beta1::MigrationSource {
                    vm_ref: ObjectRef::new("web-01"),
                    create_snapshot: true,
                    delete_after: true,
                    ..Default::default()
                },
                target: v1beta1::MigrationTarget {
                    name: "web-01-new".to_string(),
                    provider_ref: ObjectRef::new("libvirt-lab"),
                    power_on: true,
                    ..Default::default()
                },
                options: Default::default(),
                storage: Default::default(),
            },
            status: Default::default(),
        };
        original.spec.options.compress = true;

        let alpha = v1alpha1::VMMigration::from_hub(&original).unwrap();
        assert!(alpha.spec.delete_source);
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_network_attachment_roundtrip() {
        let original = v1beta1::VMNetworkAttachment {
            metadata: ObjectMeta::named("default", "app-net"),
            spec: v1beta1::VMNetworkAttachmentSpec {
                network_type: v1beta1::NetworkType::Bridged,
                mtu: Some(9000),
                vsphere: Some(v1beta1::VSphereNetwork {
                    portgroup: "pg-app".to_string(),
                    vlan: Some(42),
                }),
                libvirt: Some(v1beta1::LibvirtNetwork {
                    bridge: Some("br0".to_string()),
                    network: None,
                }),
                proxmox: None,
                ip_allocation: Default::default(),
                firewall_rules: vec![v1beta1::FirewallRule {
                    direction: v1beta1::FirewallDirection::Ingress,
                    protocol: "tcp".to_string(),
                    ports: vec!["443".to_string()],
                    peers: vec!["10.0.0.0/8".to_string()],
                    action: v1beta1::FirewallAction::Allow,
                }],
                qos: None,
            },
            status: Default::default(),
        };
        let alpha = v1alpha1::VMNetworkAttachment::from_hub(&original).unwrap();
        assert_eq!(alpha.spec.vlan, Some(42));
        assert_eq!(alpha.spec.bridge.as_deref(), Some("br0"));
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_vmset_roundtrip_preserves_update_strategy() {
        let original = v1beta1::VMSet {
            metadata: ObjectMeta::named("default", "db"),
            spec: v1beta1::VMSetSpec {
                replicas: 3,
                selector: Default::default(),
                template: Default::default(),
                update_strategy: v1beta1::UpdateStrategy {
                    strategy_type: v1beta1::UpdateStrategyType::RollingUpdate,
                    rolling_update: Some(v1beta1::RollingUpdateSpec {
                        max_unavailable: v1beta1::IntOrPercent::percent(25),
                        max_surge: v1beta1::IntOrPercent::Int(1),
                        partition: 1,
                    }),
                },
                management_policy: v1beta1::ManagementPolicy::Parallel,
                pvc_retention: Default::default(),
                ordinals: v1beta1::Ordinals { start: 10 },
                volume_claim_templates: Vec::new(),
            },
            status: Default::default(),
        };
        let alpha = v1alpha1::VMSet::from_hub(&original).unwrap();
        // Alpha has no strategy surface at all; the stash carries it.
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let original = v1beta1::VMSnapshot {
            metadata: ObjectMeta::named("default", "web-01-backup"),
            spec: v1beta1::VMSnapshotSpec {
                vm_ref: LocalObjectReference::new("web-01"),
                config: v1beta1::SnapshotConfig {
                    include_memory: true,
                    quiesce: true,
                    snapshot_type: v1beta1::SnapshotType::Application,
                    consistency: Some(v1beta1::ConsistencyLevel::ApplicationConsistent),
                    encryption: None,
                },
                retention: Some(v1beta1::RetentionPolicy {
                    max_age_hours: Some(72),
                    max_count: Some(5),
                    preserve_pinned: true,
                }),
                schedule: Some(v1beta1::SnapshotScheduleSpec {
                    cron: "0 3 * * *".to_string(),
                    time_zone: Some("America/New_York".to_string()),
                    concurrency_policy: v1beta1::ConcurrencyPolicy::Replace,
                }),
                pinned: true,
            },
            status: Default::default(),
        };
        let alpha = v1alpha1::VMSnapshot::from_hub(&original).unwrap();
        assert_eq!(alpha.spec.max_count, Some(5));
        assert!(alpha.spec.include_memory);
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_clone_roundtrip() {
        let original = v1beta1::VMClone {
            metadata: ObjectMeta::named("default", "web-01-clone"),
            spec: v1beta1::VMCloneSpec {
                source: v1beta1::CloneSource::Vm {
                    vm_ref: LocalObjectReference::new("web-01"),
                },
                target: v1beta1::CloneTarget {
                    name: "web-02".to_string(),
                    power_on: true,
                    ..Default::default()
                },
                options: v1beta1::CloneOptions {
                    clone_type: v1beta1::CloneType::Linked,
                    timeout_seconds: 600,
                    retries: 1,
                },
                customization: Some(v1beta1::Customization {
                    hostname: Some("web-02".to_string()),
                    domain: Some("corp.example".to_string()),
                    ..Default::default()
                }),
            },
            status: Default::default(),
        };
        let alpha = v1alpha1::VMClone::from_hub(&original).unwrap();
        assert_eq!(alpha.spec.hostname.as_deref(), Some("web-02"));
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_vmclass_roundtrip() {
        let original = v1beta1::VMClass {
            metadata: ObjectMeta::named("default", "medium"),
            spec: v1beta1::VMClassSpec {
                cpu: 4,
                memory: "8Gi".to_string(),
                firmware: v1beta1::Firmware::Uefi,
                disk_defaults: Some(v1beta1::DiskDefaults {
                    disk_type: v1beta1::DiskType::Thin,
                    size: Some("40Gi".to_string()),
                }),
                guest_tools: Default::default(),
                performance_profile: None,
                security_profile: None,
                extra_config: Default::default(),
            },
        };
        let alpha = v1alpha1::VMClass::from_hub(&original).unwrap();
        assert_eq!(alpha.spec.memory_mib, 8192);
        let restored = alpha.to_hub().unwrap();
        assert_eq!(restored, original);
    }
}
