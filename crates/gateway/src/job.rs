//! Job descriptors: validated request parameters, the artifact name and the
//! worker script for one archive run.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use {
    archiver_sandbox::{Mount, SandboxSpec, host_user},
    tempfile::NamedTempFile,
    uuid::Uuid,
};

/// Where the script is mounted inside the worker.
pub const SCRIPT_MOUNT: &str = "/run.sh";
/// Where the shared output directory is mounted inside the worker.
pub const OUTPUT_MOUNT: &str = "/output_mnt";
/// Where the quota-sized tmpfs is mounted inside the worker.
pub const SCRATCH_MOUNT: &str = "/tmpfs_mnt";

const CONTAINER_NAME_PREFIX: &str = "git-archiver-";

/// Validated `/archive` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub repo: String,
    pub clone_options: String,
    pub disk_quota: u64,
}

/// Settings shared by every job.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    volume_path: PathBuf,
    worker_image: String,
    extension: String,
}

impl JobBuilder {
    pub fn new(
        volume_path: impl Into<PathBuf>,
        worker_image: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            volume_path: volume_path.into(),
            worker_image: worker_image.into(),
            extension: extension.into(),
        }
    }

    /// Generate a fresh artifact name and write the worker script next to it.
    pub fn build(&self, request: &ArchiveRequest) -> std::io::Result<ArchiveJob> {
        let token = Uuid::new_v4().simple().to_string();
        let archive_name = format!("{token}.{}", self.extension);
        let script = JobScript::write_in(
            &self.volume_path,
            &render_script(&request.repo, &request.clone_options, &archive_name),
        )?;

        let spec = SandboxSpec {
            image: self.worker_image.clone(),
            command: vec!["bash".into(), SCRIPT_MOUNT.into()],
            mounts: vec![
                Mount::Bind {
                    source: script.path().to_path_buf(),
                    target: SCRIPT_MOUNT.into(),
                    read_only: true,
                },
                Mount::Bind {
                    source: self.volume_path.clone(),
                    target: OUTPUT_MOUNT.into(),
                    read_only: false,
                },
                Mount::Tmpfs {
                    target: SCRATCH_MOUNT.into(),
                    size_bytes: request.disk_quota,
                },
            ],
            user: host_user(),
            name: Some(format!("{CONTAINER_NAME_PREFIX}{token}")),
        };

        Ok(ArchiveJob {
            artifact_path: self.volume_path.join(&archive_name),
            archive_name,
            script,
            spec,
        })
    }
}

/// Everything one run needs. The script file lives as long as this value.
#[derive(Debug)]
pub struct ArchiveJob {
    pub archive_name: String,
    pub artifact_path: PathBuf,
    pub script: JobScript,
    pub spec: SandboxSpec,
}

impl ArchiveJob {
    /// Name given to the worker container, unique per job.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.spec.name.as_deref().unwrap_or_default()
    }
}

/// Worker script on disk, deleted when dropped.
#[derive(Debug)]
pub struct JobScript {
    file: NamedTempFile,
}

impl JobScript {
    pub(crate) fn write_in(dir: &Path, content: &str) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(".git-archiver-")
            .suffix(".sh")
            .tempfile_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Fill the worker template. `clone_options` is passed through as shell
/// words; the repository is quoted as a single argument.
fn render_script(repo: &str, clone_options: &str, archive_name: &str) -> String {
    let repo = quote(repo);
    let output = format!("{OUTPUT_MOUNT}/{archive_name}");
    format!(
        "#!/bin/bash\n\
         \n\
         set -ex\n\
         git clone {clone_options} {repo} {SCRATCH_MOUNT}\n\
         zip -r {output} {SCRATCH_MOUNT}\n\
         chmod 777 {output}"
    )
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
