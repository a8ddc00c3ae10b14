use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::{process::Command, runtime::Runtime};
use tracing::{debug, warn};

use super::{output_within, runtime, ExecRequest, Host, HostError, WireFormat};
use crate::config::ProbeConfig;

static CONTAINER_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "docker")]
/// run inside docker
pub struct DockerArgs {
    #[argh(option, short = 'i')]
    /// optional image, defaults to the configured one
    pub image: Option<String>,
}

impl DockerArgs {
    /// The image given on the command line wins over the configured one
    pub fn configure(&self, config: ProbeConfig) -> ProbeConfig {
        match &self.image {
            Some(image) => config.with_image(image.clone()),
            None => config,
        }
    }
}

/// Throwaway `docker run` per request, firmware root bound read-only, no network
pub struct Docker {
    pub image: String,
    /// Where the root shows up inside the container
    pub mount_point: String,
    runtime: Runtime,
}

impl Docker {
    pub fn new(config: &ProbeConfig) -> Result<Self, HostError> {
        Ok(Self {
            image: config.image.clone(),
            mount_point: config.mount_point.clone(),
            runtime: runtime()?,
        })
    }

    fn container_name(request: &ExecRequest) -> String {
        format!(
            "qemu-probe-{}-{}-{}",
            std::process::id(),
            request.arch,
            CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn command(&self, request: &ExecRequest, name: &str) -> Command {
        let mut command = Command::new("docker");
        command
            .arg("run")
            .arg("--rm")
            .arg("--net=none")
            .arg(format!("--name={name}"))
            .arg("-v")
            .arg(format!(
                "{}:{}:ro",
                request.root.display(),
                self.mount_point
            ))
            .arg(&self.image)
            .arg(request.arch.to_string())
            .arg(request.target);
        command
    }

    /// The docker cli going away doesn't stop the container, so do it by name
    fn kill(&self, name: &str) {
        self.runtime.block_on(async {
            let Ok(docker) = bollard::Docker::connect_with_local_defaults() else {
                return;
            };

            if let Err(e) = docker.kill_container::<&str>(name, None).await {
                debug!("could not kill {name}: {e}");
            }
        });
    }
}

impl Host for Docker {
    fn is_alive(&self) -> bool {
        let ping = self.runtime.block_on(async {
            let docker = bollard::Docker::connect_with_local_defaults()?;
            docker.ping().await
        });

        match ping {
            Ok(_) => true,
            Err(e) => {
                warn!("docker daemon not reachable: {e}");
                false
            }
        }
    }

    fn execute(&self, request: &ExecRequest) -> Result<Vec<u8>, HostError> {
        let name = Self::container_name(request);
        debug!(
            "{} {} in {name}",
            request.arch.qemu_user_bin(),
            request.target
        );

        let result = output_within(
            &self.runtime,
            self.command(request, &name),
            request.timeout,
        );

        if let Err(HostError::Timeout(_)) = result {
            self.kill(&name);
        }

        result
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Pickle
    }
}
