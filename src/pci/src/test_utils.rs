// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory host used by the unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use utils::wait::FakeClock;

use crate::PciManager;
use crate::accessor::{AccessError, CommandOutput, HostAccessor, command_line};
use crate::layout::SysLayout;

/// Change applied to a [`MockHost`] after a successful write to a given path, standing in
/// for what the kernel would do.
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    CreateFile(PathBuf, String),
    CreateLink(PathBuf, PathBuf),
    Remove(PathBuf),
    SetCommand(String, String),
    ClearCommand(String),
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    links: BTreeMap<PathBuf, PathBuf>,
    commands: HashMap<String, CommandOutput>,
    missing_programs: HashSet<String>,
    effects: HashMap<PathBuf, Vec<Effect>>,
    rejected: HashMap<PathBuf, io::ErrorKind>,
    writes: Vec<(PathBuf, String)>,
}

/// Lexically resolves `.` and `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

impl State {
    fn add_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn add_file(&mut self, path: PathBuf, content: String) {
        self.add_ancestors(&path);
        self.files.insert(path, content);
    }

    fn add_link(&mut self, path: PathBuf, target: PathBuf) {
        self.add_ancestors(&path);
        self.links.insert(path, target);
    }

    fn remove(&mut self, path: &Path) {
        self.files.retain(|p, _| !p.starts_with(path));
        self.dirs.retain(|p| !p.starts_with(path));
        self.links.retain(|p, _| !p.starts_with(path));
    }

    /// Follows every symlink on the way to `path`.
    fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = PathBuf::new();
        for component in normalize(path).components() {
            resolved.push(component);
            let mut hops = 0;
            while let Some(target) = self.links.get(&resolved) {
                let parent = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                resolved = normalize(&parent.join(target));
                hops += 1;
                if hops > 16 {
                    break;
                }
            }
        }
        resolved
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::CreateFile(path, content) => self.add_file(path, content),
            Effect::CreateLink(path, target) => self.add_link(path, target),
            Effect::Remove(path) => self.remove(&path),
            Effect::SetCommand(command, stdout) => {
                self.commands.insert(
                    command,
                    CommandOutput {
                        status: Some(0),
                        stdout,
                    },
                );
            }
            Effect::ClearCommand(command) => {
                self.commands.remove(&command);
            }
        }
    }
}

/// [`HostAccessor`] over an in-memory tree.
///
/// Commands without a canned output exit with status 0 and print nothing, the way lspci
/// answers for an address it does not know.
#[derive(Debug, Default)]
pub(crate) struct MockHost {
    state: RefCell<State>,
}

impl MockHost {
    pub(crate) fn with_file(self, path: &str, content: &str) -> Self {
        self.state
            .borrow_mut()
            .add_file(PathBuf::from(path), content.to_string());
        self
    }

    pub(crate) fn with_dir(self, path: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let path = PathBuf::from(path);
            state.add_ancestors(&path);
            state.dirs.insert(path);
        }
        self
    }

    pub(crate) fn with_link(self, path: &str, target: &str) -> Self {
        self.state
            .borrow_mut()
            .add_link(PathBuf::from(path), PathBuf::from(target));
        self
    }

    /// Canned standard output of a command line such as `lspci -D`.
    pub(crate) fn with_command(self, command: &str, stdout: &str) -> Self {
        self.state.borrow_mut().commands.insert(
            command.to_string(),
            CommandOutput {
                status: Some(0),
                stdout: stdout.to_string(),
            },
        );
        self
    }

    pub(crate) fn with_failing_command(self, command: &str, status: i32) -> Self {
        self.state.borrow_mut().commands.insert(
            command.to_string(),
            CommandOutput {
                status: Some(status),
                stdout: String::new(),
            },
        );
        self
    }

    /// Makes spawning `program` fail as if it were not installed.
    pub(crate) fn with_missing_program(self, program: &str) -> Self {
        self.state
            .borrow_mut()
            .missing_programs
            .insert(program.to_string());
        self
    }

    pub(crate) fn on_write(self, path: &str, effect: Effect) -> Self {
        self.state
            .borrow_mut()
            .effects
            .entry(PathBuf::from(path))
            .or_default()
            .push(effect);
        self
    }

    pub(crate) fn without_effects(self, path: &str) -> Self {
        self.state.borrow_mut().effects.remove(Path::new(path));
        self
    }

    pub(crate) fn reject_writes(self, path: &str, kind: io::ErrorKind) -> Self {
        self.state
            .borrow_mut()
            .rejected
            .insert(PathBuf::from(path), kind);
        self
    }

    /// Every accepted write, in order.
    pub(crate) fn writes(&self) -> Vec<(PathBuf, String)> {
        self.state.borrow().writes.clone()
    }
}

fn not_found() -> io::Error {
    io::Error::from(io::ErrorKind::NotFound)
}

impl HostAccessor for MockHost {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, AccessError> {
        let command = command_line(program, args);
        let state = self.state.borrow();
        if state.missing_programs.contains(program) {
            return Err(AccessError::Spawn(command, not_found()));
        }
        Ok(state.commands.get(&command).cloned().unwrap_or(CommandOutput {
            status: Some(0),
            stdout: String::new(),
        }))
    }

    fn read_file(&self, path: &Path) -> Result<String, AccessError> {
        let state = self.state.borrow();
        state
            .files
            .get(&state.resolve(path))
            .cloned()
            .ok_or_else(|| AccessError::Read(path.to_path_buf(), not_found()))
    }

    fn write_file(&self, path: &Path, value: &str) -> Result<(), AccessError> {
        let mut state = self.state.borrow_mut();
        let write_err = |err| AccessError::Write(path.to_path_buf(), value.to_string(), err);
        if let Some(kind) = state.rejected.get(path) {
            return Err(write_err(io::Error::from(*kind)));
        }
        if !state.files.contains_key(&state.resolve(path)) {
            return Err(write_err(not_found()));
        }
        state.writes.push((path.to_path_buf(), value.to_string()));
        let effects = state.effects.get(path).cloned().unwrap_or_default();
        for effect in effects {
            state.apply(effect);
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let state = self.state.borrow();
        state.files.contains_key(&state.resolve(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let state = self.state.borrow();
        state.dirs.contains(&state.resolve(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<String>, AccessError> {
        let state = self.state.borrow();
        let dir = state.resolve(path);
        if !state.dirs.contains(&dir) {
            return Err(AccessError::ReadDir(path.to_path_buf(), not_found()));
        }
        let names: BTreeSet<String> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .chain(state.links.keys())
            .filter(|entry| entry.parent() == Some(dir.as_path()))
            .filter_map(|entry| entry.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf, AccessError> {
        self.state
            .borrow()
            .links
            .get(path)
            .cloned()
            .ok_or_else(|| {
                AccessError::ReadLink(
                    path.to_path_buf(),
                    io::Error::from(io::ErrorKind::InvalidInput),
                )
            })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, AccessError> {
        if !self.exists(path) {
            return Err(AccessError::Canonicalize(path.to_path_buf(), not_found()));
        }
        Ok(self.state.borrow().resolve(path))
    }
}

/// Manager over `host` with the default `/sys` and `/proc` roots and a [`FakeClock`].
pub(crate) fn mock_manager(host: MockHost) -> PciManager<MockHost, FakeClock> {
    PciManager::new(host, SysLayout::default()).with_clock(FakeClock::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_resolve_relative_to_their_parent() {
        let host = MockHost::default()
            .with_file("/sys/devices/pci0000:00/0000:00:1f.2/ata1/host0/block/sda/size", "8")
            .with_link(
                "/sys/block/sda",
                "../devices/pci0000:00/0000:00:1f.2/ata1/host0/block/sda",
            );
        assert!(host.is_dir(Path::new("/sys/block/sda")));
        assert!(host.is_file(Path::new("/sys/block/sda/size")));
        assert_eq!(
            host.canonicalize(Path::new("/sys/block/sda")).unwrap(),
            PathBuf::from("/sys/devices/pci0000:00/0000:00:1f.2/ata1/host0/block/sda")
        );
        assert_eq!(
            host.read_dir(Path::new("/sys/block")).unwrap(),
            vec!["sda".to_string()]
        );
    }

    #[test]
    fn test_dangling_link() {
        let host = MockHost::default().with_link("/sys/class/net/eth0", "../../devices/gone");
        assert!(!host.exists(Path::new("/sys/class/net/eth0")));
        host.read_link(Path::new("/sys/class/net/eth0")).unwrap();
        host.canonicalize(Path::new("/sys/class/net/eth0"))
            .unwrap_err();
    }

    #[test]
    fn test_write_effects() {
        let host = MockHost::default()
            .with_file("/sys/bus/pci/rescan", "")
            .on_write(
                "/sys/bus/pci/rescan",
                Effect::SetCommand("lspci -D".to_string(), "0000:00:00.0 Host bridge\n".to_string()),
            );
        assert_eq!(host.run("lspci", &["-D"]).unwrap().stdout, "");
        host.write_file(Path::new("/sys/bus/pci/rescan"), "1").unwrap();
        assert_eq!(
            host.run("lspci", &["-D"]).unwrap().stdout,
            "0000:00:00.0 Host bridge\n"
        );

        host.write_file(Path::new("/sys/bus/pci/nope"), "1")
            .unwrap_err();
        assert_eq!(host.writes().len(), 1);
    }
}
