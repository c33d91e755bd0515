//! Build command implementation
//!
//! Wires the real process runner, buildah publisher and playbook runner into
//! a [`Layer`] and runs it.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::defaults::{CONTAINER_TOOL, PLAYBOOK_TOOL};
use crate::core::args::{self, ArgOverrides, LayerKind};
use crate::core::config::ImageConfig;
use crate::core::layer::Layer;
use crate::core::publish::BuildahPublisher;
use crate::error::ImageBuildError;
use crate::infra::buildah::Buildah;
use crate::infra::playbook::AnsiblePlaybook;
use crate::infra::runner::{ProcessRunner, Runner};

/// Fail early when a required tool is not on PATH
pub fn preflight(tools: &[&str]) -> Result<(), ImageBuildError> {
    for tool in tools {
        which::which(tool).map_err(|_| ImageBuildError::ToolNotFound {
            tool: (*tool).to_string(),
        })?;
    }
    Ok(())
}

/// Execute the build command
pub async fn execute(config_path: &Path, overrides: &ArgOverrides) -> Result<(), ImageBuildError> {
    let config = ImageConfig::load(config_path)?;
    let build_args = args::resolve(overrides, &config.options)?;
    build_args.log_summary();

    match &build_args.layer {
        LayerKind::Base(_) => preflight(&[CONTAINER_TOOL])?,
        LayerKind::Ansible(_) => preflight(&[CONTAINER_TOOL, PLAYBOOK_TOOL])?,
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Keyboard Interrupt");
            interrupt.cancel();
        }
    });

    let runner: Arc<dyn Runner> = Arc::new(ProcessRunner::new());
    let layer = Layer::new(
        runner.clone(),
        Arc::new(BuildahPublisher::new(Buildah::new(runner.clone()))),
        Arc::new(AnsiblePlaybook::new(runner)),
        cancel,
        build_args,
        config,
    );

    let state = layer.build().await?;
    tracing::debug!("Build finished in state {state:?}");
    Ok(())
}
