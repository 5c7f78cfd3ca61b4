// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Access to the host: external commands and single pseudo-file reads and writes.
//!
//! Everything the crate learns about the PCI inventory goes through [`HostAccessor`], so the
//! query and control logic can run against canned fixtures instead of real hardware.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

/// Errors raised while talking to the host.
#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum AccessError {
    /// Failed to run `{0}`: {1}
    Spawn(String, io::Error),
    /// `{command}` exited with status {status:?}
    ExitStatus {
        /// Command line that was run.
        command: String,
        /// Exit code, `None` when the process was killed by a signal.
        status: Option<i32>,
    },
    /// Failed to read {0:?}: {1}
    Read(PathBuf, io::Error),
    /// Failed to write {1:?} to {0:?}: {2}
    Write(PathBuf, String, io::Error),
    /// Failed to list directory {0:?}: {1}
    ReadDir(PathBuf, io::Error),
    /// Failed to read link {0:?}: {1}
    ReadLink(PathBuf, io::Error),
    /// Failed to canonicalize {0:?}: {1}
    Canonicalize(PathBuf, io::Error),
}

/// What a finished command left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Everything the command wrote to its standard output.
    pub stdout: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Renders `program` and `args` the way a shell user would type them.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capability interface over process execution and the virtual filesystems.
pub trait HostAccessor: Debug {
    /// Runs `program` with `args` (no shell involved) and captures its standard output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, AccessError>;

    /// Reads the whole file at `path`.
    fn read_file(&self, path: &Path) -> Result<String, AccessError>;

    /// Writes `value` to `path`, failing if the kernel rejects it.
    fn write_file(&self, path: &Path, value: &str) -> Result<(), AccessError>;

    /// Whether anything exists at `path`, following symlinks.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a regular file, following symlinks.
    fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` is a directory, following symlinks.
    fn is_dir(&self, path: &Path) -> bool;

    /// Names of the entries of the directory at `path`, in no particular order.
    fn read_dir(&self, path: &Path) -> Result<Vec<String>, AccessError>;

    /// Target of the symlink at `path`, unresolved.
    fn read_link(&self, path: &Path) -> Result<PathBuf, AccessError>;

    /// Absolute path of `path` with every symlink resolved.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, AccessError>;

    /// First line of the file at `path`, without the line terminator.
    fn read_one_line(&self, path: &Path) -> Result<String, AccessError> {
        let content = self.read_file(path)?;
        Ok(content.lines().next().unwrap_or_default().to_string())
    }

    /// Standard output of a command whose failure only means "no information".
    ///
    /// The exit status is ignored and whatever was printed is returned. A command that could
    /// not be spawned yields an empty string.
    fn stdout_lenient(&self, program: &str, args: &[&str]) -> String {
        match self.run(program, args) {
            Ok(output) => {
                if !output.success() {
                    debug!(
                        "`{}` exited with status {:?}",
                        command_line(program, args),
                        output.status
                    );
                }
                output.stdout
            }
            Err(err) => {
                debug!("{err}");
                String::new()
            }
        }
    }

    /// Standard output of a command that must succeed.
    fn stdout_checked(&self, program: &str, args: &[&str]) -> Result<String, AccessError> {
        let output = self.run(program, args)?;
        if !output.success() {
            return Err(AccessError::ExitStatus {
                command: command_line(program, args),
                status: output.status,
            });
        }
        Ok(output.stdout)
    }
}

/// [`HostAccessor`] backed by the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccessor;

impl HostAccessor for SystemAccessor {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, AccessError> {
        let command = command_line(program, args);
        debug!("Running `{command}`");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| AccessError::Spawn(command.clone(), err))?;

        if !output.stderr.is_empty() {
            debug!(
                "`{command}` stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn read_file(&self, path: &Path) -> Result<String, AccessError> {
        debug!("Reading {path:?}");
        let bytes = fs::read(path).map_err(|err| AccessError::Read(path.to_path_buf(), err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_file(&self, path: &Path, value: &str) -> Result<(), AccessError> {
        debug!("Writing {value:?} to {path:?}");
        fs::write(path, value)
            .map_err(|err| AccessError::Write(path.to_path_buf(), value.to_string(), err))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>, AccessError> {
        let map_err = |err| AccessError::ReadDir(path.to_path_buf(), err);
        fs::read_dir(path)
            .map_err(map_err)?
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .map_err(map_err)
            })
            .collect()
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf, AccessError> {
        fs::read_link(path).map_err(|err| AccessError::ReadLink(path.to_path_buf(), err))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, AccessError> {
        fs::canonicalize(path).map_err(|err| AccessError::Canonicalize(path.to_path_buf(), err))
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use utils::tempdir::TempDir;

    use super::*;

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("lspci", &[]), "lspci");
        assert_eq!(
            command_line("lspci", &["-Dnvmm", "-s", "0000:00:1f.2"]),
            "lspci -Dnvmm -s 0000:00:1f.2"
        );
    }

    #[test]
    fn test_run() {
        let output = SystemAccessor.run("echo", &["hello", "world"]).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello world\n");

        let output = SystemAccessor.run("sh", &["-c", "echo out; exit 3"]).unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "out\n");

        match SystemAccessor.run("/nonexistent/lspci", &["-D"]) {
            Err(AccessError::Spawn(command, _)) => assert_eq!(command, "/nonexistent/lspci -D"),
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_stdout_modes() {
        assert_eq!(
            SystemAccessor.stdout_lenient("sh", &["-c", "echo out; exit 1"]),
            "out\n"
        );
        assert_eq!(SystemAccessor.stdout_lenient("sh", &["-c", "exit 3"]), "");
        assert_eq!(SystemAccessor.stdout_lenient("/nonexistent/lsvpd", &[]), "");
        assert_eq!(SystemAccessor.stdout_lenient("echo", &["ok"]), "ok\n");

        assert_eq!(SystemAccessor.stdout_checked("echo", &["ok"]).unwrap(), "ok\n");
        let err = SystemAccessor
            .stdout_checked("sh", &["-c", "exit 2"])
            .unwrap_err();
        assert_eq!(err.to_string(), "`sh -c exit 2` exited with status Some(2)");
    }

    #[test]
    fn test_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.as_path();
        let file = root.join("type");

        SystemAccessor.write_file(&file, "identity").unwrap();
        assert_eq!(SystemAccessor.read_file(&file).unwrap(), "identity");
        SystemAccessor.write_file(&file, "DMA-FQ\nignored\n").unwrap();
        assert_eq!(SystemAccessor.read_one_line(&file).unwrap(), "DMA-FQ");

        assert!(SystemAccessor.exists(&file));
        assert!(SystemAccessor.is_file(&file));
        assert!(!SystemAccessor.is_dir(&file));
        assert!(SystemAccessor.is_dir(root));

        let missing = root.join("missing");
        assert!(!SystemAccessor.exists(&missing));
        match SystemAccessor.read_file(&missing) {
            Err(AccessError::Read(path, err)) => {
                assert_eq!(path, missing);
                assert_eq!(err.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("Unexpected result: {other:?}"),
        }
        assert!(matches!(
            SystemAccessor.write_file(&root.join("no/such/dir"), "1"),
            Err(AccessError::Write(_, value, _)) if value == "1"
        ));
    }

    #[test]
    fn test_dirs_and_links() {
        let dir = TempDir::new().unwrap();
        let root = dir.as_path();
        let device = root.join("devices/pci0000:00/0000:00:1f.2");
        fs::create_dir_all(&device).unwrap();
        fs::create_dir(root.join("class")).unwrap();
        symlink("../devices/pci0000:00/0000:00:1f.2", root.join("class/host0")).unwrap();

        let mut names = SystemAccessor.read_dir(&root.join("class")).unwrap();
        names.sort();
        assert_eq!(names, vec!["host0".to_string()]);

        assert_eq!(
            SystemAccessor.read_link(&root.join("class/host0")).unwrap(),
            PathBuf::from("../devices/pci0000:00/0000:00:1f.2")
        );
        assert_eq!(
            SystemAccessor
                .canonicalize(&root.join("class/host0"))
                .unwrap(),
            fs::canonicalize(&device).unwrap()
        );
        assert!(SystemAccessor.is_dir(&root.join("class/host0")));

        assert!(matches!(
            SystemAccessor.read_dir(&root.join("missing")),
            Err(AccessError::ReadDir(..))
        ));
        assert!(matches!(
            SystemAccessor.read_link(&device),
            Err(AccessError::ReadLink(..))
        ));
    }
}
