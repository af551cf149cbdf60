use std::path::Path;

use crate::{
    cmd::{self, Cmd, CommandRunner},
    config::InstallConfig,
    error::{InstallerError, Result},
    packages::PackageSelection,
    render, ui,
};

/// The live system's pacman configuration, used by `pacstrap`.
pub const HOST_PACMAN_CONF: &str = "/etc/pacman.conf";

pub trait PackageInstaller {
    /// Bootstraps `packages` into `root`. Any failure is reported as a
    /// package installation error.
    fn bootstrap(&mut self, root: &Path, packages: &[&str]) -> Result<()>;
    /// Appends UUID-based mount entries for everything under `root`.
    fn generate_fstab(&mut self, root: &Path, fstab: &Path) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> PackageInstaller for R {
    fn bootstrap(&mut self, root: &Path, packages: &[&str]) -> Result<()> {
        // pacstrap shows download progress; keep it interactive.
        let cmd = Cmd::new("pacstrap").arg("-K").arg(root).args(packages);
        match self.run_interactive(&cmd) {
            Err(InstallerError::CommandFailed(_, code)) => Err(InstallerError::PackageInstall(code)),
            other => other,
        }
    }

    fn generate_fstab(&mut self, root: &Path, fstab: &Path) -> Result<()> {
        let pb = ui::spinner(format!("Generating {} (UUID-based)…", fstab.display()));
        let result = self.run_append_to_file(&Cmd::new("genfstab").arg("-U").arg(root), fstab);

        if result.is_ok() {
            ui::done_spinner(pb, &format!("fstab written to {}.", fstab.display()));
        } else {
            pb.finish_and_clear();
        }
        result
    }
}

/// Enables `[multilib]` in the live system's pacman.conf so `pacstrap` can
/// resolve 32-bit packages. The host file is left alone otherwise.
fn enable_host_multilib<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<()> {
    let path = Path::new(HOST_PACMAN_CONF);
    let current = cmd::read_or_empty(runner, path)?;
    let enabled = render::enable_multilib(&current);
    if enabled != current {
        runner.write_file(path, &enabled, 0o644)?;
        ui::print_success("multilib repository enabled on the live system.");
    }
    Ok(())
}

/// Replaces world-readable vfat masks left by genfstab. Failure only warns.
fn tighten_fstab<R: CommandRunner + ?Sized>(runner: &mut R, fstab: &Path) {
    let current = match cmd::read_or_empty(runner, fstab) {
        Ok(c) => c,
        Err(e) => {
            ui::print_warning(&format!("Could not read {}: {}", fstab.display(), e));
            return;
        }
    };
    if let Some(tightened) = render::tighten_fstab(&current) {
        match runner.write_file(fstab, &tightened, 0o644) {
            Ok(()) => ui::print_success("EFI partition masks tightened to 0077."),
            Err(e) => ui::print_warning(&format!("Could not tighten {}: {}", fstab.display(), e)),
        }
    }
}

pub fn run<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    selection: &PackageSelection,
) -> Result<()> {
    if selection.needs_multilib() {
        enable_host_multilib(runner)?;
    }

    let packages = selection.packages();
    tracing::info!(count = packages.len(), kernel = config.kernel.package_name(), "bootstrapping");
    ui::print_info(&format!(
        "Installing {} packages into {}.",
        packages.len(),
        config.target_root.display()
    ));
    println!();
    runner.bootstrap(&config.target_root, &packages)?;
    ui::print_success("Base system installed.");

    let fstab = config.target("/etc/fstab");
    runner.generate_fstab(&config.target_root, &fstab)?;
    tighten_fstab(runner, &fstab);

    Ok(())
}
