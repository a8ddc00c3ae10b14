use std::path::PathBuf;
use tokio::{process::Command, runtime::Runtime};
use tracing::debug;

use super::{output_within, runtime, ExecRequest, Host, HostError};

#[derive(argh::FromArgs)]
#[argh(subcommand, name = "native")]
/// run a local runner program instead of a container
pub struct NativeArgs {
    #[argh(option, short = 'r')]
    /// runner to invoke as `<runner> [args..] <root> <arch> <target>`
    pub runner: PathBuf,

    #[argh(option, short = 'a')]
    /// extra leading argument for the runner, may be repeated
    pub arg: Vec<String>,
}

impl NativeArgs {
    pub fn start(self) -> Result<Native, HostError> {
        Native::new(self.runner, self.arg)
    }
}

/// Speaks the same protocol as the container, but nothing is isolated
pub struct Native {
    pub runner: PathBuf,
    pub args: Vec<String>,
    runtime: Runtime,
}

impl Native {
    pub fn new(runner: PathBuf, args: Vec<String>) -> Result<Self, HostError> {
        Ok(Self {
            runner,
            args,
            runtime: runtime()?,
        })
    }

    fn command(&self, request: &ExecRequest) -> Command {
        let mut command = Command::new(&self.runner);
        command
            .args(&self.args)
            .arg(request.root)
            .arg(request.arch.to_string())
            .arg(request.target);
        command
    }
}

impl Host for Native {
    fn is_alive(&self) -> bool {
        self.runner.is_file()
    }

    fn execute(&self, request: &ExecRequest) -> Result<Vec<u8>, HostError> {
        debug!("{:?} {} {}", self.runner, request.arch, request.target);
        output_within(&self.runtime, self.command(request), request.timeout)
    }
}
