//! Image publishing
//!
//! Labels the finished container, commits it to local storage and/or a
//! registry, then removes the build container and images it no longer
//! needs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::config::defaults::LABEL_PREFIX;
use crate::core::args::{BuildArgs, LayerKind};
use crate::core::config::ImageConfig;
use crate::error::PublishError;
use crate::infra::buildah::{Buildah, ContainerHandle};

/// Hand-off point for a finished container
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store the image wherever `args` asks for and release the container
    async fn publish(
        &self,
        container: &ContainerHandle,
        args: &BuildArgs,
        config: &ImageConfig,
    ) -> Result<(), PublishError>;
}

/// Standard image labels, user labels first so the standard keys win
pub fn generate_labels(
    args: &BuildArgs,
    config: &ImageConfig,
    build_date: DateTime<Local>,
) -> BTreeMap<String, String> {
    let mut labels = args.labels.clone();
    let mut set = |key: &str, value: String| {
        labels.insert(format!("{LABEL_PREFIX}.{key}"), value);
    };

    set("name", args.name.clone());
    set("type", args.layer.as_str().to_string());
    set("parent", args.parent.clone());
    if let LayerKind::Base(base) = &args.layer {
        set("package-manager", base.backend.to_string());
    }
    set("tags", args.publish.tags.join(","));
    set("build-date", build_date.to_rfc3339());

    if !config.repos.is_empty() {
        let aliases: Vec<&str> = config.repos.iter().map(|r| r.alias.as_str()).collect();
        set("repositories", aliases.join(","));
    }
    if !config.packages.is_empty() {
        set("packages", config.packages.join(","));
    }
    if !config.package_groups.is_empty() {
        set("package-groups", config.package_groups.join(","));
    }
    labels
}

/// [`Publisher`] backed by buildah
#[derive(Debug, Clone)]
pub struct BuildahPublisher {
    buildah: Buildah,
}

impl BuildahPublisher {
    pub fn new(buildah: Buildah) -> Self {
        Self { buildah }
    }

    async fn publish_local(&self, cid: &str, args: &BuildArgs) -> Result<(), PublishError> {
        tracing::info!("Publishing to local storage");
        for tag in &args.publish.tags {
            let image = format!("{}:{tag}", args.name);
            self.buildah
                .commit(cid, &image)
                .await
                .map_err(|source| PublishError::Commit { image, source })?;
        }
        Ok(())
    }

    async fn publish_registry(
        &self,
        cid: &str,
        registry: &str,
        args: &BuildArgs,
    ) -> Result<(), PublishError> {
        tracing::info!("Publishing to registry at {registry}");
        let tags = &args.publish.tags;
        let first = tags.first().ok_or_else(|| PublishError::NoTags {
            image: args.name.clone(),
            registry: registry.to_string(),
        })?;
        let image = format!("{}:{first}", args.name);
        self.buildah
            .commit(cid, &image)
            .await
            .map_err(|source| PublishError::Commit {
                image: image.clone(),
                source,
            })?;

        for tag in tags {
            let tagged = format!("{}:{tag}", args.name);
            self.buildah
                .tag(&image, &tagged)
                .await
                .map_err(|source| PublishError::Tag {
                    image: tagged.clone(),
                    source,
                })?;

            let destination = format!("{registry}/{tagged}");
            tracing::info!("pushing layer {} to {destination}", args.name);
            self.buildah
                .push(&tagged, &destination, &args.publish.registry_opts_push)
                .await
                .map_err(|source| PublishError::Push {
                    image: tagged.clone(),
                    registry: registry.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Remove the build container and images nobody asked to keep
    ///
    /// Failures are logged as warnings.
    async fn clean_up(&self, container: &ContainerHandle, args: &BuildArgs) {
        if let Err(e) = self.buildah.remove(&container.id).await {
            tracing::warn!("Failed to remove container {}: {e}", container.id);
        }
        if !args.publish.local && args.publish.registry.is_some() {
            for tag in &args.publish.tags {
                let image = format!("{}:{tag}", args.name);
                if let Err(e) = self.buildah.remove_image(&image).await {
                    tracing::warn!("Failed to remove image {image}: {e}");
                }
            }
        }
        if !container.is_scratch() {
            if let Err(e) = self.buildah.remove_image(&container.parent).await {
                tracing::warn!("Failed to remove parent image {}: {e}", container.parent);
            }
        }
    }
}

#[async_trait]
impl Publisher for BuildahPublisher {
    async fn publish(
        &self,
        container: &ContainerHandle,
        args: &BuildArgs,
        config: &ImageConfig,
    ) -> Result<(), PublishError> {
        let targets = &args.publish;
        if targets.any() {
            let labels = generate_labels(args, config, Local::now());
            tracing::debug!("Labels: {labels:?}");
            self.buildah
                .label(&container.id, &labels)
                .await
                .map_err(|source| PublishError::Label {
                    container: container.id.clone(),
                    source,
                })?;
        }

        if targets.local {
            self.publish_local(&container.id, args).await?;
        }
        if let Some(registry) = &targets.registry {
            self.publish_registry(&container.id, registry, args).await?;
        }

        self.clean_up(container, args).await;
        Ok(())
    }
}
