//! Configures the installed system: files rendered in Rust, then the typed
//! chroot script, then passwords, then the boot loader entries.

use std::path::Path;

use crate::{
    cmd::{self, Cmd, CommandRunner},
    config::{InstallConfig, Secret},
    error::{InstallerError, Result},
    hardware::HardwareProfile,
    packages::PackageSelection,
    render,
    script::{ChrootScript, AUR_SUDOERS, SCRIPT_PATH},
    ui,
};

const FILE_MODE: u32 = 0o644;
const SUDOERS_MODE: u32 = 0o440;
const SCRIPT_MODE: u32 = 0o700;

/// Stand-in shown in dry-run boot entries, where `blkid` prints nothing.
const DRY_RUN_UUID: &str = "<luks-partition-uuid>";

pub trait ChrootExecutor {
    /// Runs a script that already exists inside `root` at `script`.
    fn run_script(&mut self, root: &Path, script: &str) -> Result<()>;
    /// Sets each `(user, password)` through `chpasswd` on stdin.
    fn set_passwords(&mut self, root: &Path, entries: &[(&str, &Secret)]) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> ChrootExecutor for R {
    fn run_script(&mut self, root: &Path, script: &str) -> Result<()> {
        self.run_interactive(&Cmd::new("arch-chroot").arg(root).args(["/bin/bash", script]))
    }

    fn set_passwords(&mut self, root: &Path, entries: &[(&str, &Secret)]) -> Result<()> {
        let input: String = entries
            .iter()
            .map(|(user, pw)| format!("{}:{}\n", user, pw.expose()))
            .collect();
        self.run_with_input(&Cmd::new("arch-chroot").arg(root).arg("chpasswd"), &input)
    }
}

// ── System files ──────────────────────────────────────────────────────────────

/// Reads a distribution default from the target, applies `edit`, and writes
/// it back.
fn rewrite<R, F>(runner: &mut R, path: &Path, edit: F) -> Result<()>
where
    R: CommandRunner + ?Sized,
    F: FnOnce(&str) -> String,
{
    let current = cmd::read_or_empty(runner, path)?;
    runner.write_file(path, &edit(&current), FILE_MODE)
}

fn write_system_files<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    hw: &HardwareProfile,
    selection: &PackageSelection,
) -> Result<()> {
    let t = |p: &str| config.target(p);

    runner.write_file(&t("/etc/hostname"), &render::hostname(config), FILE_MODE)?;
    runner.write_file(&t("/etc/hosts"), &render::hosts(config), FILE_MODE)?;
    runner.write_file(&t("/etc/locale.conf"), &render::locale_conf(config), FILE_MODE)?;
    runner.write_file(&t("/etc/vconsole.conf"), &render::vconsole_conf(config), FILE_MODE)?;
    rewrite(runner, &t("/etc/locale.gen"), |c| {
        render::enable_locale(c, &config.localization.locale)
    })?;
    ui::print_success("Hostname, hosts and locale written.");

    let multilib = selection.needs_multilib();
    rewrite(runner, &t("/etc/pacman.conf"), |c| render::tune_pacman_conf(c, multilib))?;
    runner.write_file(&t("/etc/sudoers.d/10-wheel"), &render::wheel_sudoers(), SUDOERS_MODE)?;

    let env_path = t("/etc/environment");
    let env = cmd::read_or_empty(runner, &env_path)?;
    if let Some(merged) = render::merge_environment(&env, render::desktop_environment_vars(config.desktop)) {
        runner.write_file(&env_path, &merged, FILE_MODE)?;
    }

    let skel = t("/etc/skel");
    for (rel, contents) in render::desktop_skeleton(config.desktop) {
        let path = skel.join(rel);
        if runner.path_exists(&path) {
            tracing::debug!(path = %path.display(), "skeleton file exists, keeping it");
            continue;
        }
        runner.write_file(&path, contents, FILE_MODE)?;
    }
    ui::print_success(&format!("{} defaults seeded into /etc/skel.", config.desktop.display_name()));

    let hooks = render::initramfs_hooks(config.swap, hw);
    render::validate_hook_order(&hooks)?;
    rewrite(runner, &t("/etc/mkinitcpio.conf"), |c| render::set_hooks(c, &hooks))?;
    ui::print_info(&format!("Initramfs hooks: {}", hooks.join(" ")));

    if config.swap_volume().is_none() {
        runner.write_file(&t("/etc/systemd/zram-generator.conf"), &render::zram_generator_conf(), FILE_MODE)?;
    }
    runner.write_file(&t("/etc/sysctl.d/99-installer.conf"), &render::sysctl_conf(config.swap), FILE_MODE)?;
    ui::print_success(&format!("Swap configured: {}.", config.swap.display_name()));

    Ok(())
}

// ── Chroot script ─────────────────────────────────────────────────────────────

fn remove_quietly<R: CommandRunner + ?Sized>(runner: &mut R, path: &Path) {
    if !runner.is_dry_run() && !runner.path_exists(path) {
        return;
    }
    if let Err(e) = runner.remove_file(path) {
        ui::print_warning(&format!("Could not remove {}: {}", path.display(), e));
    }
}

fn run_chroot_script<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    hw: &HardwareProfile,
) -> Result<()> {
    let script = ChrootScript::for_install(config, hw).render()?;
    let host_path = ChrootScript::host_path(config);
    let aur_grant = config.target(AUR_SUDOERS);

    if config.aur_helper {
        runner.write_file(&aur_grant, &render::temporary_sudoers(&config.username), SUDOERS_MODE)?;
    }
    runner.write_file(&host_path, &script, SCRIPT_MODE)?;

    ui::print_info("Configuring the new system inside arch-chroot…");
    println!();
    let result = runner.run_script(&config.target_root, SCRIPT_PATH);

    remove_quietly(runner, &host_path);
    if config.aur_helper {
        remove_quietly(runner, &aur_grant);
    }
    result?;

    ui::print_success("Chroot configuration complete.");
    Ok(())
}

// ── Boot loader ───────────────────────────────────────────────────────────────

fn luks_uuid<R: CommandRunner + ?Sized>(runner: &mut R, config: &InstallConfig) -> Result<String> {
    let out = runner.run_capture(
        &Cmd::new("blkid")
            .args(["-s", "UUID", "-o", "value"])
            .arg(&config.root_partition),
    )?;
    let uuid = out.trim();
    if !uuid.is_empty() {
        return Ok(uuid.to_string());
    }
    if runner.is_dry_run() {
        return Ok(DRY_RUN_UUID.to_string());
    }
    Err(InstallerError::invalid_config(format!(
        "blkid reported no UUID for {}",
        config.root_partition.display()
    )))
}

fn write_boot_entries<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    hw: &HardwareProfile,
) -> Result<()> {
    let uuid = luks_uuid(runner, config)?;
    let cmdline = render::kernel_cmdline(config, hw, &uuid);
    tracing::info!(cmdline = %cmdline, "kernel command line");

    let loader = config.boot_dir().join("loader");
    runner.write_file(&loader.join("loader.conf"), &render::loader_conf(), FILE_MODE)?;
    runner.write_file(
        &loader.join("entries/arch.conf"),
        &render::boot_entry(config.kernel, &cmdline, false),
        FILE_MODE,
    )?;
    runner.write_file(
        &loader.join("entries/arch-fallback.conf"),
        &render::boot_entry(config.kernel, &cmdline, true),
        FILE_MODE,
    )?;
    ui::print_success(&format!("systemd-boot entries written for {}.", config.kernel.display_name()));
    Ok(())
}

// ── Stage ─────────────────────────────────────────────────────────────────────

pub fn run<R: CommandRunner + ?Sized>(
    runner: &mut R,
    config: &InstallConfig,
    hw: &HardwareProfile,
    selection: &PackageSelection,
) -> Result<()> {
    write_system_files(runner, config, hw, selection)?;
    run_chroot_script(runner, config, hw)?;

    runner.set_passwords(
        &config.target_root,
        &[(config.username.as_str(), &config.password), ("root", &config.password)],
    )?;
    ui::print_success(&format!("Passwords set for {} and root.", config.username));

    write_boot_entries(runner, config, hw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Answers, Desktop, Localization};
    use crate::hardware::{Chassis, CpuVendor, GpuVendor};
    use crate::recorder::{Event, Recorder};

    const UUID: &str = "0a1b2c3d-1111-2222-3333-444455556666";

    fn config(hibernate: bool, aur_helper: bool) -> InstallConfig {
        let answers = Answers {
            hostname: "box".into(),
            disk: "sda".into(),
            gaming: false,
            hibernate,
            desktop: Desktop::Plasma,
            aur_helper,
            username: "alice".into(),
            password: Secret::new("s3cr3t'pw"),
        };
        InstallConfig::from_answers(answers, Localization::default(), "/mnt").unwrap()
    }

    fn hardware(gpus: Vec<GpuVendor>) -> HardwareProfile {
        HardwareProfile {
            cpu: CpuVendor::Intel,
            gpus,
            chassis: Chassis::Laptop,
        }
    }

    fn configure(cfg: &InstallConfig, hw: &HardwareProfile, r: &mut Recorder) -> Result<()> {
        let selection = PackageSelection::assemble(cfg, hw);
        run(r, cfg, hw, &selection)
    }

    #[test]
    fn writes_system_files_with_modes() {
        let cfg = config(false, false);
        let hw = hardware(vec![]);
        let mut r = Recorder::new()
            .with_capture("blkid", &format!("{}\n", UUID))
            .with_file("/mnt/etc/locale.gen", "#en_US.UTF-8 UTF-8\n#de_DE.UTF-8 UTF-8\n")
            .with_file("/mnt/etc/mkinitcpio.conf", "MODULES=()\nHOOKS=(base udev)\n");
        configure(&cfg, &hw, &mut r).unwrap();

        assert_eq!(r.file("/mnt/etc/hostname"), Some("box\n"));
        assert!(r.file("/mnt/etc/locale.gen").unwrap().starts_with("en_US.UTF-8 UTF-8\n#de_DE"));
        assert_eq!(r.modes[Path::new("/mnt/etc/sudoers.d/10-wheel")], 0o440);
        assert!(r.file("/mnt/etc/systemd/zram-generator.conf").is_some());
        assert!(r.file("/mnt/etc/mkinitcpio.conf").unwrap().contains("HOOKS=(base udev autodetect microcode modconf kms"));
        assert!(r.file("/mnt/etc/environment").unwrap().contains("QT_QPA_PLATFORM"));
        assert!(r.file("/mnt/etc/skel/.config/kwinrc").is_some());
    }

    #[test]
    fn existing_skeleton_files_are_kept() {
        let cfg = config(false, false);
        let mut r = Recorder::new()
            .with_capture("blkid", UUID)
            .with_file("/mnt/etc/skel/.config/kwinrc", "[custom]\n");
        configure(&cfg, &hardware(vec![]), &mut r).unwrap();
        assert_eq!(r.file("/mnt/etc/skel/.config/kwinrc"), Some("[custom]\n"));
    }

    #[test]
    fn script_runs_then_is_removed_and_passwords_go_through_stdin() {
        let cfg = config(false, false);
        let mut r = Recorder::new().with_capture("blkid", UUID);
        configure(&cfg, &hardware(vec![]), &mut r).unwrap();

        assert!(r.ran_line_containing("arch-chroot /mnt /bin/bash /root/arch-installer-setup.sh"));
        assert!(r.file("/mnt/root/arch-installer-setup.sh").is_none());
        assert!(r.events.contains(&Event::Remove("/mnt/root/arch-installer-setup.sh".into())));

        let input = r
            .events
            .iter()
            .find_map(|e| match e {
                Event::WithInput(c, input) if c.arguments().last().map(String::as_str) == Some("chpasswd") => {
                    Some(input.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(input, "alice:s3cr3t'pw\nroot:s3cr3t'pw\n");
        assert!(!r.command_lines().iter().any(|l| l.contains("s3cr3t")));
    }

    #[test]
    fn failing_script_is_still_removed() {
        let cfg = config(false, true);
        let mut r = Recorder::new().failing("arch-chroot");
        assert!(configure(&cfg, &hardware(vec![]), &mut r).is_err());
        assert!(r.file("/mnt/root/arch-installer-setup.sh").is_none());
        assert!(r.file("/mnt/etc/sudoers.d/99-arch-installer-aur").is_none());
        assert!(!r.ran("blkid"));
    }

    #[test]
    fn aur_grant_is_temporary() {
        let cfg = config(false, true);
        let mut r = Recorder::new().with_capture("blkid", UUID);
        configure(&cfg, &hardware(vec![]), &mut r).unwrap();

        let grant = Path::new("/mnt/etc/sudoers.d/99-arch-installer-aur");
        assert_eq!(r.modes[grant], 0o440);
        assert!(r.file(grant).is_none());
    }

    #[test]
    fn boot_entries_for_hibernate_with_nvidia() {
        let cfg = config(true, false);
        let hw = hardware(vec![GpuVendor::Nvidia]);
        let mut r = Recorder::new().with_capture("blkid", &format!("{}\n", UUID));
        configure(&cfg, &hw, &mut r).unwrap();

        assert!(r.ran_line_containing("blkid -s UUID -o value /dev/sda2"));
        let entry = r.file("/mnt/boot/loader/entries/arch.conf").unwrap();
        assert!(entry.contains(&format!("cryptdevice=UUID={}:cryptlvm root=/dev/vg0/root rw", UUID)));
        assert!(entry.contains("resume=/dev/vg0/swap"));
        assert!(entry.contains("nvidia_drm.modeset=1"));
        assert!(r.file("/mnt/boot/loader/entries/arch-fallback.conf").unwrap().contains("fallback"));
        assert!(r.file("/mnt/boot/loader/loader.conf").is_some());

        assert!(r.file("/mnt/etc/systemd/zram-generator.conf").is_none());
        let hooks = r.file("/mnt/etc/mkinitcpio.conf").unwrap();
        assert!(!hooks.contains(" kms "));
        assert!(hooks.contains("lvm2 resume filesystems"));
    }

    #[test]
    fn missing_uuid_is_an_error() {
        let cfg = config(false, false);
        let mut r = Recorder::new();
        let err = configure(&cfg, &hardware(vec![]), &mut r).unwrap_err();
        assert!(matches!(err, InstallerError::InvalidConfig(ref m) if m.contains("/dev/sda2")));
    }
}
