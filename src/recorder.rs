//! In-memory `CommandRunner` that records what would have happened.
//!
//! Used by the test suites to run every installer stage without root,
//! real disks or a network.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    path::{Path, PathBuf},
};

use crate::{
    cmd::{Cmd, CommandRunner},
    error::{InstallerError, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Run(Cmd),
    Interactive(Cmd),
    Capture(Cmd),
    /// Stdin content is kept so tests can check what was fed in.
    WithInput(Cmd, String),
    Append(Cmd, PathBuf),
    BestEffort(Cmd),
    Write(PathBuf),
    Remove(PathBuf),
}

impl Event {
    pub fn cmd(&self) -> Option<&Cmd> {
        match self {
            Event::Run(c)
            | Event::Interactive(c)
            | Event::Capture(c)
            | Event::WithInput(c, _)
            | Event::Append(c, _)
            | Event::BestEffort(c) => Some(c),
            Event::Write(_) | Event::Remove(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub files: BTreeMap<PathBuf, String>,
    pub modes: BTreeMap<PathBuf, u32>,
    captures: HashMap<String, String>,
    failing: HashSet<String>,
    /// Whether `/dev` nodes report as present.
    devices_ready: bool,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            files: BTreeMap::new(),
            modes: BTreeMap::new(),
            captures: HashMap::new(),
            failing: HashSet::new(),
            devices_ready: true,
        }
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned stdout for every captured invocation of `program`.
    pub fn with_capture(mut self, program: &str, stdout: &str) -> Self {
        self.captures.insert(program.to_string(), stdout.to_string());
        self
    }

    /// Every invocation of `program` exits with status 1.
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files.insert(path.into(), contents.to_string());
        self
    }

    pub fn without_devices(mut self) -> Self {
        self.devices_ready = false;
        self
    }

    pub fn commands(&self) -> impl Iterator<Item = &Cmd> {
        self.events.iter().filter_map(Event::cmd)
    }

    /// Command lines in execution order, rendered with `Display`.
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().map(|c| c.to_string()).collect()
    }

    pub fn ran(&self, program: &str) -> bool {
        self.commands().any(|c| c.program() == program)
    }

    /// Whether any recorded command line contains `needle`.
    pub fn ran_line_containing(&self, needle: &str) -> bool {
        self.command_lines().iter().any(|l| l.contains(needle))
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    fn check(&self, cmd: &Cmd) -> Result<()> {
        if self.failing.contains(cmd.program()) {
            Err(InstallerError::CommandFailed(cmd.program().to_string(), 1))
        } else {
            Ok(())
        }
    }
}

impl CommandRunner for Recorder {
    fn run_with_spinner(&mut self, cmd: &Cmd, _spin_msg: &str, _done_msg: &str) -> Result<()> {
        self.events.push(Event::Run(cmd.clone()));
        self.check(cmd)
    }

    fn run_interactive(&mut self, cmd: &Cmd) -> Result<()> {
        self.events.push(Event::Interactive(cmd.clone()));
        self.check(cmd)
    }

    fn run_capture(&mut self, cmd: &Cmd) -> Result<String> {
        self.events.push(Event::Capture(cmd.clone()));
        self.check(cmd)?;
        Ok(self.captures.get(cmd.program()).cloned().unwrap_or_default())
    }

    fn run_with_input(&mut self, cmd: &Cmd, input: &str) -> Result<()> {
        self.events.push(Event::WithInput(cmd.clone(), input.to_string()));
        self.check(cmd)
    }

    fn run_append_to_file(&mut self, cmd: &Cmd, path: &Path) -> Result<()> {
        self.events.push(Event::Append(cmd.clone(), path.to_path_buf()));
        self.check(cmd)?;
        let out = self.captures.get(cmd.program()).cloned().unwrap_or_default();
        self.files.entry(path.to_path_buf()).or_default().push_str(&out);
        Ok(())
    }

    fn run_best_effort(&mut self, cmd: &Cmd) -> bool {
        self.events.push(Event::BestEffort(cmd.clone()));
        self.check(cmd).is_ok()
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || (self.devices_ready && path.starts_with("/dev"))
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            InstallerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not recorded", path.display()),
            ))
        })
    }

    fn write_file(&mut self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        self.events.push(Event::Write(path.to_path_buf()));
        self.files.insert(path.to_path_buf(), contents.to_string());
        self.modes.insert(path.to_path_buf(), mode);
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        self.events.push(Event::Remove(path.to_path_buf()));
        self.files.remove(path);
        Ok(())
    }
}
