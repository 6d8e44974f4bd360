//! External `mount.<fstype>` helper programs.
//!
//! Used when the kernel reports "no such device" for a filesystem type it
//! has no built-in driver for (FUSE filesystems, glusterfs, sshfs, ...).

use std::ffi::OsString;
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::MountError;

/// Arguments handed to a mount helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    /// Filesystem type; selects the helper program.
    pub fs_type: String,
    /// Mount source.
    pub source: String,
    /// Mount target.
    pub target: PathBuf,
    /// Option string, passed as `-o` when non-empty.
    pub options: String,
}

impl HelperInvocation {
    /// Conventional helper name, `mount.<fstype>`.
    #[must_use]
    pub fn program(&self) -> String {
        format!("mount.{}", self.fs_type)
    }

    /// Command-line arguments: `<source> <target> [-o <options>]`.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(&self.source),
            self.target.clone().into_os_string(),
        ];
        let options = self.options.trim();
        if !options.is_empty() {
            args.push("-o".into());
            args.push(options.into());
        }
        args
    }
}

/// Strategy for running a mount helper, injected into the executor.
#[async_trait]
pub trait MountHelper: Send + Sync + fmt::Debug {
    /// Run the helper; any non-zero exit is an error.
    async fn run(&self, invocation: &HelperInvocation) -> Result<(), MountError>;
}

/// Runs the real helper binary as a child process.
#[derive(Debug, Clone)]
pub struct ExecMountHelper {
    search_dirs: Vec<PathBuf>,
}

impl Default for ExecMountHelper {
    fn default() -> Self {
        Self::new(justmount_common::defaults::helper_search_dirs())
    }
}

impl ExecMountHelper {
    /// Create a helper runner probing `search_dirs` after `PATH`.
    #[must_use]
    pub const fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Locate `program` on `PATH`, then in the fixed directories.
    #[must_use]
    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok().or_else(|| {
            self.search_dirs
                .iter()
                .map(|dir| dir.join(program))
                .find(|candidate| is_executable(candidate))
        })
    }

    /// Locate `program` on the blocking pool, since the lookup stats files.
    async fn resolve(&self, program: &str) -> Result<PathBuf, MountError> {
        let helper = self.clone();
        let lookup = program.to_string();
        tokio::task::spawn_blocking(move || helper.locate(&lookup))
            .await
            .map_err(|e| MountError::Os(std::io::Error::other(e)))?
            .ok_or_else(|| MountError::HelperNotFound {
                program: program.to_string(),
                searched: self.searched(),
            })
    }

    fn searched(&self) -> String {
        self.search_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[async_trait]
impl MountHelper for ExecMountHelper {
    async fn run(&self, invocation: &HelperInvocation) -> Result<(), MountError> {
        let program = invocation.program();
        let path = self.resolve(&program).await?;

        tracing::debug!(
            helper = %path.display(),
            args = ?invocation.args(),
            "Running mount helper"
        );

        let output = tokio::process::Command::new(&path)
            .args(invocation.args())
            .output()
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    MountError::HelperNotFound {
                        program: program.clone(),
                        searched: self.searched(),
                    }
                } else {
                    MountError::Os(err)
                }
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(MountError::HelperFailed {
            program,
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        })
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn invocation(fs_type: &str, options: &str) -> HelperInvocation {
        HelperInvocation {
            fs_type: fs_type.to_string(),
            source: "gluster:media".to_string(),
            target: PathBuf::from("/stage/vol"),
            options: options.to_string(),
        }
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn program_and_args() {
        let inv = invocation("glusterfs", "rw,allow_other");
        assert_eq!(inv.program(), "mount.glusterfs");
        assert_eq!(
            inv.args(),
            vec![
                OsString::from("gluster:media"),
                OsString::from("/stage/vol"),
                OsString::from("-o"),
                OsString::from("rw,allow_other"),
            ]
        );
    }

    #[test]
    fn options_flag_omitted_when_empty() {
        let inv = invocation("glusterfs", "  ");
        assert_eq!(inv.args().len(), 2);
    }

    #[test]
    fn locates_in_fixed_directories() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "mount.justmounttestfs", "exit 0");
        let helper = ExecMountHelper::new(vec![dir.path().to_path_buf()]);

        assert_eq!(helper.locate("mount.justmounttestfs"), Some(script));
        assert_eq!(helper.locate("mount.justmountmissingfs"), None);
    }

    #[test]
    fn non_executable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mount.justmountplainfs"), "").unwrap();
        let helper = ExecMountHelper::new(vec![dir.path().to_path_buf()]);

        assert_eq!(helper.locate("mount.justmountplainfs"), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn resolves_helper_from_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "mount.justmountpoolfs", "exit 0");
        let helper = ExecMountHelper::new(vec![dir.path().to_path_buf()]);

        assert_eq!(helper.resolve("mount.justmountpoolfs").await.unwrap(), script);

        let err = helper.resolve("mount.justmountmissingfs").await.unwrap_err();
        match err {
            MountError::HelperNotFound { searched, .. } => {
                assert_eq!(searched, dir.path().display().to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_helper_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let helper = ExecMountHelper::new(vec![dir.path().to_path_buf()]);

        let err = helper
            .run(&invocation("justmountmissingfs", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::HelperNotFound { .. }));
    }

    #[tokio::test]
    async fn helper_exit_status_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args");
        write_script(
            dir.path(),
            "mount.justmountokfs",
            &format!("echo \"$@\" > {}", log.display()),
        );
        write_script(dir.path(), "mount.justmountbadfs", "echo broken >&2; exit 3");
        let helper = ExecMountHelper::new(vec![dir.path().to_path_buf()]);

        helper
            .run(&invocation("justmountokfs", "rw,allow_other"))
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(&log).unwrap().trim(),
            "gluster:media /stage/vol -o rw,allow_other"
        );

        let err = helper
            .run(&invocation("justmountbadfs", ""))
            .await
            .unwrap_err();
        match err {
            MountError::HelperFailed { output, .. } => assert_eq!(output, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
