use std::{
    io::Read,
    process::{Command, Output, Stdio},
    time::Duration,
};

use {
    tokio::runtime::{Builder, Handle},
    tracing::{debug, info, warn},
};

use crate::{
    error::SandboxError,
    runtime::{Mount, SandboxHandle, SandboxRuntime, SandboxSpec},
};

/// Label stamped on every worker container so leaked ones can be found with
/// `docker ps -a --filter label=git-archiver.worker`.
pub const WORKER_LABEL: &str = "git-archiver.worker";

/// Docker backend driving the container CLI.
///
/// `cli` is the binary name (e.g. `"docker"`, or `"podman"` which accepts the
/// same `--mount` syntax). `host`, when set, is exported as `DOCKER_HOST`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    cli: String,
    host: Option<String>,
}

impl DockerCli {
    pub fn new(cli: impl Into<String>, host: Option<String>) -> Self {
        Self {
            cli: cli.into(),
            host,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.cli);
        if let Some(ref host) = self.host {
            cmd.env("DOCKER_HOST", host);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    fn run(&self, op: &'static str, args: &[&str]) -> Result<Output, SandboxError> {
        let output = self
            .command()
            .args(args)
            .output()
            .map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            return Err(self.command_error(op, &output));
        }
        Ok(output)
    }

    fn spawn_error(&self, source: std::io::Error) -> SandboxError {
        SandboxError::Spawn {
            cli: self.cli.clone(),
            source,
        }
    }

    /// Drive `fut` to completion from a blocking pool thread, on the
    /// surrounding runtime when there is one.
    fn block_on<F: Future>(&self, fut: F) -> Result<F::Output, SandboxError> {
        match Handle::try_current() {
            Ok(handle) => Ok(handle.block_on(fut)),
            Err(_) => {
                let rt = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|source| self.spawn_error(source))?;
                Ok(rt.block_on(fut))
            },
        }
    }

    fn command_error(&self, op: &'static str, output: &Output) -> SandboxError {
        SandboxError::Command {
            cli: self.cli.clone(),
            op,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Check whether the CLI is installed and the daemon answers.
    pub fn ping(&self) -> Result<(), SandboxError> {
        self.run("version", &["version", "--format", "{{.Server.Version}}"])
            .map(|out| {
                let version = String::from_utf8_lossy(&out.stdout);
                info!(cli = %self.cli, server = %version.trim(), "container daemon reachable");
            })
    }
}

/// Arguments for `docker create`.
fn create_args(spec: &SandboxSpec) -> Result<Vec<String>, SandboxError> {
    let mut args = vec![
        "create".to_string(),
        "--label".to_string(),
        WORKER_LABEL.to_string(),
    ];

    if let Some(ref name) = spec.name {
        args.extend(["--name".to_string(), name.clone()]);
    }
    if let Some(ref user) = spec.user {
        args.extend(["--user".to_string(), user.clone()]);
    }
    for mount in &spec.mounts {
        args.extend(["--mount".to_string(), mount_arg(mount)?]);
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    Ok(args)
}

/// Render a mount in `--mount` syntax. Commas separate fields there, so
/// paths containing one cannot be expressed.
fn mount_arg(mount: &Mount) -> Result<String, SandboxError> {
    let reject_comma = |field: &str| {
        if field.contains(',') {
            Err(SandboxError::InvalidSpec(format!(
                "mount path contains a comma: {field}"
            )))
        } else {
            Ok(())
        }
    };

    reject_comma(mount.target())?;
    match mount {
        Mount::Bind {
            source,
            target,
            read_only,
        } => {
            let source = source.display().to_string();
            reject_comma(&source)?;
            let mut arg = format!("type=bind,source={source},target={target}");
            if *read_only {
                arg.push_str(",readonly");
            }
            Ok(arg)
        },
        Mount::Tmpfs { target, size_bytes } => {
            if *size_bytes == 0 {
                return Err(SandboxError::InvalidSpec(
                    "tmpfs size must be greater than 0".into(),
                ));
            }
            Ok(format!("type=tmpfs,target={target},tmpfs-size={size_bytes}"))
        },
    }
}

impl SandboxRuntime for DockerCli {
    fn backend_name(&self) -> &'static str {
        "docker"
    }

    fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        let args = create_args(spec)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run("create", &args)?;

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(SandboxError::UnexpectedOutput {
                op: "create",
                output: id,
            });
        }
        Ok(SandboxHandle::new(id))
    }

    fn start(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        self.run("start", &["start", sandbox.id()])?;
        Ok(())
    }

    fn wait(&self, sandbox: &SandboxHandle, timeout: Duration) -> Result<i64, SandboxError> {
        let mut cmd = tokio::process::Command::from(self.command());
        cmd.args(["wait", sandbox.id()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Only the waiter is killed on timeout; the container itself is
            // left for the caller's forced removal.
            .kill_on_drop(true);

        let waited = self.block_on(async {
            match cmd.spawn() {
                Ok(child) => tokio::time::timeout(timeout, child.wait_with_output()).await,
                Err(source) => Ok(Err(source)),
            }
        })?;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(self.spawn_error(source)),
            Err(_elapsed) => {
                debug!(container = %sandbox, "docker wait deadline reached");
                return Err(SandboxError::Timeout {
                    id: sandbox.id().to_string(),
                    timeout,
                });
            },
        };
        if !output.status.success() {
            return Err(self.command_error("wait", &output));
        }
        parse_exit_code(&String::from_utf8_lossy(&output.stdout))
    }

    /// Worker output with stdout and stderr on one pipe, so `set -x` traces
    /// stay interleaved with the commands' own errors.
    fn logs(&self, sandbox: &SandboxHandle) -> Result<String, SandboxError> {
        let (mut reader, writer) = std::io::pipe().map_err(|source| self.spawn_error(source))?;
        let mut child = {
            let mut cmd = self.command();
            cmd.args(["logs", sandbox.id()])
                .stdout(
                    writer
                        .try_clone()
                        .map_err(|source| self.spawn_error(source))?,
                )
                .stderr(writer);
            cmd.spawn().map_err(|source| self.spawn_error(source))?
            // `cmd` drops here with the parent's write ends, so the read
            // below sees EOF once the child exits.
        };

        let mut combined = Vec::new();
        let read = reader.read_to_end(&mut combined);
        let status = child.wait().map_err(|source| self.spawn_error(source))?;
        read.map_err(|source| self.spawn_error(source))?;

        let text = String::from_utf8_lossy(&combined).into_owned();
        if !status.success() {
            return Err(SandboxError::Command {
                cli: self.cli.clone(),
                op: "logs",
                stderr: text.trim().to_string(),
            });
        }
        Ok(text)
    }

    fn remove(&self, sandbox: &SandboxHandle) -> Result<(), SandboxError> {
        match self.run("rm", &["rm", "--force", "--volumes", sandbox.id()]) {
            Ok(_) => Ok(()),
            Err(SandboxError::Command { ref stderr, .. }) if is_missing_container(stderr) => {
                debug!(container = %sandbox, "container already gone");
                Ok(())
            },
            Err(e) => {
                warn!(container = %sandbox, error = %e, "container removal failed");
                Err(e)
            },
        }
    }
}

fn parse_exit_code(stdout: &str) -> Result<i64, SandboxError> {
    // `docker wait` prints one status code per container argument.
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
        .ok_or_else(|| SandboxError::UnexpectedOutput {
            op: "wait",
            output: stdout.to_string(),
        })
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such container") || lower.contains("no container with name or id")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest, std::path::PathBuf};

    fn job_spec() -> SandboxSpec {
        SandboxSpec {
            image: "elice/git-and-zip:alpine".into(),
            command: vec!["bash".into(), "/run.sh".into()],
            mounts: vec![
                Mount::Bind {
                    source: PathBuf::from("/tmp/run-abc.sh"),
                    target: "/run.sh".into(),
                    read_only: true,
                },
                Mount::Bind {
                    source: PathBuf::from("/tmp"),
                    target: "/output_mnt".into(),
                    read_only: false,
                },
                Mount::Tmpfs {
                    target: "/tmpfs_mnt".into(),
                    size_bytes: 52_428_800,
                },
            ],
            user: Some("1000:1000".into()),
            name: Some("git-archiver-abc".into()),
        }
    }

    #[test]
    fn create_args_bind_all_three_mounts() {
        let args = create_args(&job_spec()).unwrap();
        assert_eq!(args, vec![
            "create",
            "--label",
            "git-archiver.worker",
            "--name",
            "git-archiver-abc",
            "--user",
            "1000:1000",
            "--mount",
            "type=bind,source=/tmp/run-abc.sh,target=/run.sh,readonly",
            "--mount",
            "type=bind,source=/tmp,target=/output_mnt",
            "--mount",
            "type=tmpfs,target=/tmpfs_mnt,tmpfs-size=52428800",
            "elice/git-and-zip:alpine",
            "bash",
            "/run.sh",
        ]);
    }

    #[test]
    fn rejects_comma_in_mount_source() {
        let mut spec = job_spec();
        spec.mounts[1] = Mount::Bind {
            source: PathBuf::from("/srv/a,b"),
            target: "/output_mnt".into(),
            read_only: false,
        };
        assert!(matches!(
            create_args(&spec),
            Err(SandboxError::InvalidSpec(_))
        ));
    }

    #[test]
    fn rejects_comma_in_mount_target() {
        let err = mount_arg(&Mount::Tmpfs {
            target: "/tmpfs,mnt".into(),
            size_bytes: 1,
        })
        .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidSpec(_)));
    }

    #[test]
    fn rejects_zero_sized_tmpfs() {
        let err = mount_arg(&Mount::Tmpfs {
            target: "/tmpfs_mnt".into(),
            size_bytes: 0,
        })
        .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidSpec(_)));
    }

    #[rstest]
    #[case("0\n", 0)]
    #[case("137\n", 137)]
    #[case("\n  1  \n", 1)]
    fn parses_wait_output(#[case] stdout: &str, #[case] code: i64) {
        assert_eq!(parse_exit_code(stdout).unwrap(), code);
    }

    #[test]
    fn garbage_wait_output_is_an_error() {
        assert!(matches!(
            parse_exit_code("Error response from daemon"),
            Err(SandboxError::UnexpectedOutput { op: "wait", .. })
        ));
    }

    #[rstest]
    #[case("Error response from daemon: No such container: 4f1c2e", true)]
    #[case("Error: no container with name or ID \"x\" found: no such container", true)]
    #[case("Cannot connect to the Docker daemon", false)]
    fn recognises_missing_container(#[case] stderr: &str, #[case] missing: bool) {
        assert_eq!(is_missing_container(stderr), missing);
    }

    /// Stand-in CLI: `wait slow` never returns, `wait <other>` prints 3, and
    /// `logs` alternates between stdout and stderr.
    #[cfg(unix)]
    const FAKE_CLI: &str = "#!/bin/sh
case \"$1\" in
  wait)
    [ \"$2\" = slow ] && exec sleep 30
    echo 3 ;;
  logs)
    echo '+ git clone https://example.com/a.git'
    echo 'fatal: repository not found' >&2
    echo '+ zip -r'
    ;;
  *) exit 1 ;;
esac
";

    #[cfg(unix)]
    fn fake_cli(dir: &std::path::Path) -> DockerCli {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-docker");
        std::fs::write(&path, FAKE_CLI).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        DockerCli::new(path.display().to_string(), None)
    }

    #[cfg(unix)]
    #[test]
    fn wait_returns_the_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_cli(dir.path());
        let code = docker
            .wait(&SandboxHandle::new("fast"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn wait_with_unbounded_timeout_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_cli(dir.path());
        let code = docker
            .wait(&SandboxHandle::new("fast"), Duration::MAX)
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_times_out_on_a_blocking_worker() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_cli(dir.path());
        let started = std::time::Instant::now();

        let err = tokio::task::spawn_blocking(move || {
            docker.wait(&SandboxHandle::new("slow"), Duration::from_millis(200))
        })
        .await
        .unwrap()
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn logs_keep_stdout_and_stderr_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_cli(dir.path());
        let logs = docker.logs(&SandboxHandle::new("x")).unwrap();
        assert_eq!(
            logs,
            "+ git clone https://example.com/a.git\nfatal: repository not found\n+ zip -r\n"
        );
    }

    #[test]
    fn missing_cli_is_a_spawn_error() {
        let docker = DockerCli::new("git-archiver-no-such-cli", None);
        let err = docker.start(&SandboxHandle::new("x")).unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
    }
}
