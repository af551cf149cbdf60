use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::Path,
    process::{Command, Stdio},
};

use dialoguer::Confirm;

use crate::{
    error::{InstallerError, Result},
    ui,
};

// ── Command description ───────────────────────────────────────────────────────

/// A program plus its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for a in args {
            self = self.arg(a);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut c = Command::new(&self.program);
        c.args(&self.args);
        c
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        Ok(())
    }
}

// ── Runner capability ─────────────────────────────────────────────────────────

/// Everything the installer does to the outside world goes through this
/// trait: subprocesses and file access on the live system and target root.
pub trait CommandRunner {
    /// Run silently with a spinner; captured output is shown only on failure.
    fn run_with_spinner(&mut self, cmd: &Cmd, spin_msg: &str, done_msg: &str) -> Result<()>;

    /// Run with the terminal handed over (pacstrap progress, cryptsetup prompts).
    fn run_interactive(&mut self, cmd: &Cmd) -> Result<()>;

    /// Run and return stdout.
    fn run_capture(&mut self, cmd: &Cmd) -> Result<String>;

    /// Run with `input` written to stdin. The input is never logged.
    fn run_with_input(&mut self, cmd: &Cmd, input: &str) -> Result<()>;

    /// Run and append stdout to `path` (equivalent to `>> path`).
    fn run_append_to_file(&mut self, cmd: &Cmd, path: &Path) -> Result<()>;

    /// Run, ignoring failure. Returns whether the command succeeded.
    fn run_best_effort(&mut self, cmd: &Cmd) -> bool;

    fn path_exists(&self, path: &Path) -> bool;

    fn read_file(&self, path: &Path) -> Result<String>;

    /// Creates parent directories as needed and sets `mode` on the file.
    fn write_file(&mut self, path: &Path, contents: &str, mode: u32) -> Result<()>;

    fn remove_file(&mut self, path: &Path) -> Result<()>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Reads a file, treating a missing file as empty.
pub fn read_or_empty<R: CommandRunner + ?Sized>(runner: &R, path: &Path) -> Result<String> {
    match runner.read_file(path) {
        Ok(s) => Ok(s),
        Err(InstallerError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

// ── Real implementation ───────────────────────────────────────────────────────

/// Runs commands on the live system. With `dry_run` set, commands and writes
/// are printed instead of executed.
#[derive(Debug, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn simulate(&self, cmd: &Cmd) {
        tracing::info!(command = %cmd, "dry-run: skipped");
        ui::print_dry_run(&cmd.to_string());
    }

    /// Retries once after offering to install the package that provides a
    /// missing program.
    fn with_install_offer<T>(
        &self,
        cmd: &Cmd,
        mut attempt: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        match attempt() {
            Err(InstallerError::CommandNotFound(_)) => {
                offer_install(cmd.program())?;
                attempt()
            }
            other => other,
        }
    }
}

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn failed(cmd: &Cmd, code: Option<i32>) -> InstallerError {
    let code = code.unwrap_or(-1);
    tracing::error!(command = %cmd, code, "command failed");
    InstallerError::CommandFailed(cmd.program().to_string(), code)
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        tracing::error!(stderr = %err.trim(), "captured stderr");
        eprintln!("{}", err.trim());
    }
}

/// Read-only inspection tools that still run in dry-run, so the disk table
/// and hardware detection show the real machine.
pub fn runs_in_dry_run(program: &str) -> bool {
    matches!(program, "lsblk" | "lspci")
}

fn capture(cmd: &Cmd) -> Result<String> {
    let output = cmd
        .to_command()
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| not_found_or_io(cmd.program(), e))?;
    if !output.status.success() {
        print_captured_output(&[], &output.stderr);
        return Err(failed(cmd, output.status.code()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Maps a binary name to the Arch package that provides it.
pub fn package_for(program: &str) -> &str {
    match program {
        "mkfs.fat" | "mkfs.vfat" | "fsck.fat" => "dosfstools",
        "mkfs.ext4" | "e2fsck" | "tune2fs" => "e2fsprogs",
        "sgdisk" | "gdisk" => "gptfdisk",
        "partprobe" | "parted" => "parted",
        "cryptsetup" => "cryptsetup",
        "pvcreate" | "vgcreate" | "lvcreate" | "vgchange" => "lvm2",
        "wipefs" | "mkswap" | "swapon" | "swapoff" | "mount" | "umount" | "lsblk"
        | "blkid" => "util-linux",
        "pacstrap" | "genfstab" | "arch-chroot" => "arch-install-scripts",
        "lspci" => "pciutils",
        other => other,
    }
}

/// When `program` is not found, asks the user whether to install the
/// providing package on the live system via `pacman -S`.
fn offer_install(program: &str) -> Result<()> {
    let pkg = package_for(program);

    ui::print_warning(&format!("Command '{}' not found.", program));
    println!();

    if !Confirm::new()
        .with_prompt(format!("Install '{}' with pacman?", pkg))
        .default(true)
        .interact()?
    {
        return Err(InstallerError::CommandNotFound(program.to_string()));
    }

    println!();
    tracing::info!(package = pkg, "installing missing tool on live system");
    let status = Command::new("pacman")
        .args(["-Sy", "--noconfirm", pkg])
        .status()
        .map_err(|e| not_found_or_io("pacman", e))?;

    if !status.success() {
        return Err(InstallerError::CommandFailed(
            "pacman".to_string(),
            status.code().unwrap_or(-1),
        ));
    }

    Ok(())
}

impl CommandRunner for SystemRunner {
    fn run_with_spinner(&mut self, cmd: &Cmd, spin_msg: &str, done_msg: &str) -> Result<()> {
        tracing::info!(command = %cmd, "running");
        if self.dry_run {
            self.simulate(cmd);
            ui::print_success(done_msg);
            return Ok(());
        }

        self.with_install_offer(cmd, || {
            let pb = ui::spinner(spin_msg);
            let result = cmd
                .to_command()
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map_err(|e| not_found_or_io(cmd.program(), e));
            pb.finish_and_clear();

            let output = result?;
            if !output.status.success() {
                print_captured_output(&output.stdout, &output.stderr);
                return Err(failed(cmd, output.status.code()));
            }
            ui::print_success(done_msg);
            Ok(())
        })
    }

    fn run_interactive(&mut self, cmd: &Cmd) -> Result<()> {
        tracing::info!(command = %cmd, "running interactively");
        if self.dry_run {
            self.simulate(cmd);
            return Ok(());
        }

        self.with_install_offer(cmd, || {
            let status = cmd
                .to_command()
                .status()
                .map_err(|e| not_found_or_io(cmd.program(), e))?;
            if !status.success() {
                return Err(failed(cmd, status.code()));
            }
            Ok(())
        })
    }

    fn run_capture(&mut self, cmd: &Cmd) -> Result<String> {
        tracing::debug!(command = %cmd, "capturing");
        if self.dry_run {
            if runs_in_dry_run(cmd.program()) {
                return capture(cmd);
            }
            self.simulate(cmd);
            return Ok(String::new());
        }

        self.with_install_offer(cmd, || capture(cmd))
    }

    fn run_with_input(&mut self, cmd: &Cmd, input: &str) -> Result<()> {
        tracing::info!(command = %cmd, "running with redacted stdin");
        if self.dry_run {
            self.simulate(cmd);
            return Ok(());
        }

        self.with_install_offer(cmd, || {
            let mut child = cmd
                .to_command()
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| not_found_or_io(cmd.program(), e))?;

            // The child is always reaped, even when it closes stdin early.
            let written = match child.stdin.take() {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            };

            let output = child.wait_with_output()?;
            if !output.status.success() {
                print_captured_output(&output.stdout, &output.stderr);
                return Err(failed(cmd, output.status.code()));
            }
            written?;
            Ok(())
        })
    }

    fn run_append_to_file(&mut self, cmd: &Cmd, path: &Path) -> Result<()> {
        tracing::info!(command = %cmd, path = %path.display(), "appending output");
        if self.dry_run {
            ui::print_dry_run(&format!("{} >> {}", cmd, path.display()));
            return Ok(());
        }

        self.with_install_offer(cmd, || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            let status = cmd
                .to_command()
                .stdout(file)
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| not_found_or_io(cmd.program(), e))?;
            if !status.success() {
                return Err(failed(cmd, status.code()));
            }
            Ok(())
        })
    }

    fn run_best_effort(&mut self, cmd: &Cmd) -> bool {
        tracing::debug!(command = %cmd, "best-effort");
        if self.dry_run {
            self.simulate(cmd);
            return true;
        }

        match cmd
            .to_command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!(command = %cmd, code = ?status.code(), "best-effort command failed");
                false
            }
            Err(e) => {
                tracing::warn!(command = %cmd, error = %e, "best-effort command could not start");
                false
            }
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        // Partition nodes never appear in dry-run.
        path.exists() || (self.dry_run && path.starts_with("/dev"))
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn write_file(&mut self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        tracing::info!(path = %path.display(), mode = %format!("{:o}", mode), "writing file");
        if self.dry_run {
            ui::print_dry_run(&format!("write {} ({} bytes)", path.display(), contents.len()));
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        // `mode` only applies on creation; enforce it for existing files too.
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "removing file");
        if self.dry_run {
            ui::print_dry_run(&format!("rm {}", path.display()));
            return Ok(());
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_display_joins_args() {
        let cmd = Cmd::new("sgdisk").args(["--zap-all", "/dev/sda"]);
        assert_eq!(cmd.to_string(), "sgdisk --zap-all /dev/sda");
        assert_eq!(cmd.program(), "sgdisk");
        assert_eq!(cmd.arguments(), ["--zap-all", "/dev/sda"]);
    }

    #[test]
    fn package_lookup() {
        assert_eq!(package_for("sgdisk"), "gptfdisk");
        assert_eq!(package_for("arch-chroot"), "arch-install-scripts");
        assert_eq!(package_for("pvcreate"), "lvm2");
        assert_eq!(package_for("unknown-tool"), "unknown-tool");
    }

    #[test]
    fn write_read_remove_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/sudoers.d/10-wheel");
        let mut runner = SystemRunner::new(false);

        runner.write_file(&path, "%wheel ALL=(ALL:ALL) ALL\n", 0o440).unwrap();
        assert!(runner.path_exists(&path));
        assert_eq!(runner.read_file(&path).unwrap(), "%wheel ALL=(ALL:ALL) ALL\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o440);

        runner.remove_file(&path).unwrap();
        assert!(!runner.path_exists(&path));
        assert_eq!(read_or_empty(&runner, &path).unwrap(), "");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");
        let mut runner = SystemRunner::new(true);
        runner.write_file(&path, "box\n", 0o644).unwrap();
        assert!(!path.exists());
        assert!(runner.path_exists(Path::new("/dev/nvme9n9p9")));
    }

    #[test]
    fn capture_and_failure() {
        let mut runner = SystemRunner::new(false);
        let out = runner.run_capture(&Cmd::new("echo").arg("hello")).unwrap();
        assert_eq!(out.trim(), "hello");

        let err = runner.run_capture(&Cmd::new("false")).unwrap_err();
        assert!(matches!(err, InstallerError::CommandFailed(ref p, 1) if p == "false"));
        assert!(!runner.run_best_effort(&Cmd::new("false")));
    }

    #[test]
    fn input_reaches_stdin() {
        let mut runner = SystemRunner::new(false);
        let cmd = Cmd::new("sh").args(["-c", "read l; test \"$l\" = hello"]);
        runner.run_with_input(&cmd, "hello\n").unwrap();

        let err = runner.run_with_input(&cmd, "bye\n").unwrap_err();
        assert!(matches!(err, InstallerError::CommandFailed(ref p, 1) if p == "sh"));
    }

    #[test]
    fn child_exiting_before_reading_input_reports_its_status() {
        let mut runner = SystemRunner::new(false);
        let input = "x".repeat(1 << 20);
        let err = runner.run_with_input(&Cmd::new("false"), &input).unwrap_err();
        assert!(matches!(err, InstallerError::CommandFailed(ref p, 1) if p == "false"));
    }

    #[test]
    fn dry_run_only_inspects() {
        assert!(runs_in_dry_run("lsblk"));
        assert!(runs_in_dry_run("lspci"));
        assert!(!runs_in_dry_run("blkid"));
        assert!(!runs_in_dry_run("sgdisk"));

        let mut runner = SystemRunner::new(true);
        assert_eq!(runner.run_capture(&Cmd::new("echo").arg("hello")).unwrap(), "");
    }

    #[test]
    fn append_to_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/fstab");
        let mut runner = SystemRunner::new(false);
        runner.run_append_to_file(&Cmd::new("echo").arg("a"), &path).unwrap();
        runner.run_append_to_file(&Cmd::new("echo").arg("b"), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
