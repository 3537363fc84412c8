//! VMImage reconciler.
//!
//! Prepares an image per provider on demand. VM reconcilers request a
//! provider by appending it to the requested-providers annotation; this
//! loop acquires the bits through the provider's import path (HTTP and
//! registry sources), or just verifies presence for provider-resident
//! sources, and tracks availability per provider in status.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use virtrigaud_api::meta::{Object, ObjectRef};
use virtrigaud_api::v1beta1::{
    ImageAvailability, ImagePhase, ImageSource, OnMissing, VMImage, IMAGE_FINALIZER,
    REQUESTED_PROVIDERS_ANNOTATION,
};
use virtrigaud_common::conditions::{self, Condition, ConditionStatus};
use virtrigaud_proto::provider as pb;
use virtrigaud_store::ObjectKey;

use crate::context::Context;
use crate::runtime::{Action, ReconcileError, Reconciler};

pub struct ImageReconciler {
    ctx: Arc<Context>,
}

impl ImageReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Providers that have asked for this image.
    fn requested_providers(image: &VMImage) -> Vec<String> {
        image
            .metadata
            .annotations
            .get(REQUESTED_PROVIDERS_ANNOTATION)
            .map(|list| {
                list.split(',')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any VM still references this image.
    async fn referenced(&self, image: &VMImage) -> bool {
        let ns = &image.metadata.namespace;
        self.ctx
            .vms
            .list(Some(ns))
            .await
            .iter()
            .any(|vm| {
                vm.spec
                    .image_ref
                    .as_ref()
                    .map(|r| r.name == image.metadata.name)
                    .unwrap_or(false)
            })
    }

    /// Drive preparation on one provider. Returns the updated availability
    /// entry plus whether a task is still in flight.
    async fn prepare_on(
        &self,
        image: &VMImage,
        provider_name: &str,
    ) -> Result<(ImageAvailability, bool), ReconcileError> {
        let ns = &image.metadata.namespace;
        let mut entry = image
            .status
            .providers
            .get(provider_name)
            .cloned()
            .unwrap_or_default();

        if entry.available {
            return Ok((entry, false));
        }

        let provider_ref = ObjectRef::new(provider_name.to_string());
        let client = self.ctx.provider_client(ns, &provider_ref).await?;

        // Poll an outstanding preparation task first.
        if let Some(task_ref) = entry.task_ref.clone() {
            let status = client.task_status(&task_ref).await?;
            if !status.done {
                entry.message = Some(format!("preparing ({}%)", status.progress_percent));
                return Ok((entry, true));
            }
            entry.task_ref = None;
            if status.error.is_empty() {
                entry.available = true;
                entry.prepared_at = Some(Utc::now());
                entry.message = None;
                info!(
                    image = %image.metadata.key(),
                    provider = provider_name,
                    "Image prepared"
                );
                return Ok((entry, false));
            }
            warn!(
                image = %image.metadata.key(),
                provider = provider_name,
                error = %status.error,
                "Image preparation failed"
            );
            entry.message = Some(status.error);
            return Ok((entry, false));
        }

        match &image.spec.source {
            // Provider-resident sources: presence only, no copy.
            ImageSource::VSphere { template, content_library } => {
                entry.available = true;
                entry.provider_image_id = template.clone().or_else(|| {
                    content_library
                        .as_ref()
                        .map(|c| format!("{}/{}", c.library, c.item))
                });
                entry.prepared_at = Some(Utc::now());
                Ok((entry, false))
            }
            ImageSource::Libvirt { path, pool, volume } => {
                entry.available = true;
                entry.provider_image_id = path.clone().or_else(|| {
                    Some(format!(
                        "{}/{}",
                        pool.clone().unwrap_or_default(),
                        volume.clone().unwrap_or_default()
                    ))
                });
                entry.prepared_at = Some(Utc::now());
                Ok((entry, false))
            }
            ImageSource::Proxmox { template_id, template_name, .. } => {
                entry.available = true;
                entry.provider_image_id = template_id
                    .map(|id| id.to_string())
                    .or_else(|| template_name.clone());
                entry.prepared_at = Some(Utc::now());
                Ok((entry, false))
            }
            // Claim-backed source: available once the claim is bound.
            ImageSource::DataVolume { name } => {
                let bound = self
                    .ctx
                    .pvcs
                    .try_get(ns, name)
                    .await
                    .map(|pvc| pvc.status.phase == "Bound")
                    .unwrap_or(false);
                if bound {
                    entry.available = true;
                    entry.provider_image_id = Some(name.clone());
                    entry.prepared_at = Some(Utc::now());
                } else {
                    entry.message = Some(format!("waiting for claim {name} to bind"));
                }
                Ok((entry, false))
            }
            // Acquired sources: import through the provider.
            ImageSource::Http { url, .. } | ImageSource::Registry { image: url, .. } => {
                let format = image
                    .spec
                    .prepare
                    .preferred_format
                    .map(|f| f.as_str().to_string())
                    .unwrap_or_default();
                let response = client
                    .import_disk(pb::ImportDiskRequest {
                        name: image.metadata.name.clone(),
                        source_url: url.clone(),
                        format,
                        storage_hint: String::new(),
                        verify_checksum: image.spec.prepare.checksum.is_some(),
                        expected_checksum: image.spec.prepare.checksum.clone().unwrap_or_default(),
                    })
                    .await?;
                debug!(
                    image = %image.metadata.key(),
                    provider = provider_name,
                    task = %response.task_id,
                    "Image import issued"
                );
                entry.provider_image_id = Some(response.disk_id);
                if response.task_id.is_empty() {
                    entry.available = true;
                    entry.prepared_at = Some(Utc::now());
                } else {
                    entry.task_ref = Some(response.task_id);
                }
                let pending = !entry.available;
                Ok((entry, pending))
            }
        }
    }
}

#[async_trait]
impl Reconciler for ImageReconciler {
    fn name(&self) -> &'static str {
        "vmimage"
    }

    #[instrument(skip(self), fields(image = %key))]
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError> {
        let Some(image) = self.ctx.images.try_get(&key.namespace, &key.name).await else {
            return Ok(Action::AwaitChange);
        };

        // Deletion is deferred while VMs still reference the image.
        if image.metadata.is_deleting() {
            if self.referenced(&image).await {
                self.ctx.recorder.warning(
                    VMImage::KIND,
                    image.metadata.key(),
                    "DeletionBlocked",
                    "image is still referenced by VMs",
                );
                return Ok(Action::Requeue(self.ctx.intervals.drift()));
            }
            self.ctx
                .images
                .modify(&key.namespace, &key.name, |image| {
                    image.metadata.remove_finalizer(IMAGE_FINALIZER);
                })
                .await?;
            return Ok(Action::AwaitChange);
        }

        if !image.metadata.has_finalizer(IMAGE_FINALIZER) {
            self.ctx
                .images
                .modify(&key.namespace, &key.name, |image| {
                    image.metadata.add_finalizer(IMAGE_FINALIZER);
                })
                .await?;
            return Ok(Action::Requeue(std::time::Duration::ZERO));
        }

        let targets = Self::requested_providers(&image);
        if targets.is_empty() {
            // Nothing asked for it yet.
            return Ok(Action::AwaitChange);
        }

        let mut in_flight = false;
        let mut failed_message: Option<String> = None;
        let mut entries = Vec::new();

        for provider_name in &targets {
            if image.spec.prepare.on_missing == OnMissing::Fail
                && !image.available_on(provider_name)
            {
                failed_message =
                    Some(format!("image missing on {provider_name}, prepare policy is Fail"));
                entries.push((
                    provider_name.clone(),
                    ImageAvailability {
                        message: failed_message.clone(),
                        ..Default::default()
                    },
                ));
                continue;
            }
            if image.spec.prepare.on_missing == OnMissing::Wait
                && !image.available_on(provider_name)
            {
                entries.push((
                    provider_name.clone(),
                    ImageAvailability {
                        message: Some("waiting for out-of-band preparation".to_string()),
                        ..Default::default()
                    },
                ));
                continue;
            }

            let (entry, task_pending) = self.prepare_on(&image, provider_name).await?;
            in_flight |= task_pending;
            entries.push((provider_name.clone(), entry));
        }

        let all_available = entries.iter().all(|(_, e)| e.available);
        let had_failure = entries
            .iter()
            .any(|(_, e)| !e.available && e.message.is_some() && e.task_ref.is_none());

        // Aggregate phase over the per-provider machines.
        let retry_exhausted = image.status.retry_count >= image.spec.prepare.retry_limit;
        let phase = if failed_message.is_some() || (had_failure && retry_exhausted) {
            ImagePhase::Failed
        } else if all_available {
            match image.status.phase {
                // Post-acquisition passes run once each.
                ImagePhase::Converting => {
                    if image.spec.prepare.optimize {
                        ImagePhase::Optimizing
                    } else {
                        ImagePhase::Ready
                    }
                }
                ImagePhase::Optimizing | ImagePhase::Ready => ImagePhase::Ready,
                _ => {
                    if image.spec.prepare.preferred_format.is_some() {
                        ImagePhase::Converting
                    } else if image.spec.prepare.optimize {
                        ImagePhase::Optimizing
                    } else {
                        ImagePhase::Ready
                    }
                }
            }
        } else if in_flight {
            ImagePhase::Importing
        } else if had_failure {
            ImagePhase::Downloading
        } else {
            ImagePhase::Pending
        };

        let bump_retry = had_failure && !retry_exhausted;
        let generation = image.metadata.generation;
        let updated = self
            .ctx
            .images
            .modify_status(&key.namespace, &key.name, |image| {
                for (provider_name, entry) in &entries {
                    image
                        .status
                        .providers
                        .insert(provider_name.clone(), entry.clone());
                }
                image.status.phase = phase;
                image.status.message = failed_message
                    .clone()
                    .or_else(|| entries.iter().find_map(|(_, e)| e.message.clone()));
                if bump_retry {
                    image.status.retry_count += 1;
                }
                image.status.last_prepare_time = Some(Utc::now());
                image.status.observed_generation = generation;
                conditions::set_condition(
                    &mut image.status.conditions,
                    match phase {
                        ImagePhase::Ready => Condition::new(
                            conditions::types::READY,
                            ConditionStatus::True,
                            "Prepared",
                            "",
                        ),
                        ImagePhase::Failed => Condition::new(
                            conditions::types::READY,
                            ConditionStatus::False,
                            "PrepareFailed",
                            image.status.message.clone().unwrap_or_default(),
                        ),
                        _ => Condition::new(
                            conditions::types::READY,
                            ConditionStatus::False,
                            "Preparing",
                            "",
                        ),
                    },
                );
            })
            .await?;

        match updated.status.phase {
            ImagePhase::Ready => Ok(Action::AwaitChange),
            ImagePhase::Failed => Ok(Action::AwaitChange),
            ImagePhase::Converting | ImagePhase::Optimizing => {
                Ok(Action::Requeue(std::time::Duration::ZERO))
            }
            _ if in_flight => Ok(Action::Requeue(self.ctx.intervals.task_poll())),
            _ => Ok(Action::Requeue(self.ctx.intervals.dependency())),
        }
    }
}
