use anyhow::Context;
use qemu_probe::{
    analyzer::{AnalysisResult, Analyzer, InputObject},
    config::{ProbeConfig, DEFAULT_TIMEOUT_SECONDS, DEFAULT_WORKERS},
    detect::{ElfDetector, TypeDetector},
    extract::ArchiveExtractor,
    host::{
        docker::{Docker, DockerArgs},
        native::NativeArgs,
        Host,
    },
    uid,
};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(argh::FromArgs)]
/// test the binaries inside a firmware image for executability under qemu
struct Arguments {
    /// firmware: a tar archive, an unpacked directory or a single binary
    #[argh(positional)]
    input: PathBuf,

    #[argh(option, short = 't', default = "DEFAULT_TIMEOUT_SECONDS")]
    /// seconds before a single run is killed
    timeout: u64,

    #[argh(option, short = 'w', default = "DEFAULT_WORKERS")]
    /// how many runs to have going at once
    workers: usize,

    #[argh(switch, short = 'v')]
    /// debug logging
    verbose: bool,

    #[argh(switch)]
    /// print the result on a single line
    compact: bool,

    #[argh(subcommand)]
    host: HostArgs,
}

#[derive(argh::FromArgs)]
#[argh(subcommand)]
enum HostArgs {
    Docker(DockerArgs),
    Native(NativeArgs),
}

fn main() -> anyhow::Result<()> {
    let Arguments {
        input,
        timeout,
        workers,
        verbose,
        compact,
        host,
    } = argh::from_env();

    let default_level = if verbose {
        "qemu_probe=debug"
    } else {
        "qemu_probe=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = ProbeConfig::default()
        .with_timeout(Duration::from_secs(timeout))
        .with_workers(workers);

    let object = describe_input(&input).with_context(|| format!("reading {input:?}"))?;
    info!("{} ({}) is {}", object.uid, input.display(), object.mime);

    let output = match host {
        HostArgs::Docker(args) => {
            let config = args.configure(config);
            let docker = Docker::new(&config).context("setting up docker")?;
            analyze(docker, &object, config)?
        }
        HostArgs::Native(args) => {
            let native = args.start().context("setting up runner")?;
            analyze(native, &object, config)?
        }
    };

    let json = if compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{json}");

    Ok(())
}

fn analyze<H: Host>(
    host: H,
    object: &InputObject,
    config: ProbeConfig,
) -> anyhow::Result<AnalysisResult> {
    let analyzer = Analyzer::new(host, ElfDetector, ArchiveExtractor, config);
    analyzer
        .run(object)
        .with_context(|| format!("analyzing {}", object.uid))
}

/// Works out what the analyzer would be told about `input` by an unpacker
fn describe_input(input: &Path) -> anyhow::Result<InputObject> {
    if input.is_dir() {
        let files_included = WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().display().to_string())
            .collect();

        return Ok(InputObject {
            uid: input.display().to_string(),
            file_path: Some(input.to_path_buf()),
            mime: "inode/directory".to_string(),
            files_included,
        });
    }

    let uid = uid::content_id_of(input)?;

    if let Some(file_type) = ElfDetector.file_type(input) {
        return Ok(InputObject {
            uid,
            file_path: Some(input.to_path_buf()),
            mime: file_type.mime,
            files_included: vec![],
        });
    }

    let (mime, files_included) = match tar_members(input) {
        Ok(members) if !members.is_empty() => ("application/x-tar", members),
        _ => ("application/octet-stream", vec![]),
    };

    Ok(InputObject {
        uid,
        file_path: Some(input.to_path_buf()),
        mime: mime.to_string(),
        files_included,
    })
}

fn tar_members(path: &Path) -> io::Result<Vec<String>> {
    let mut archive = tar::Archive::new(File::open(path)?);
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            members.push(entry.path()?.display().to_string());
        }
    }
    Ok(members)
}
