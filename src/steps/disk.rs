//! Wipe, partition, encrypt, carve logical volumes, format and mount.
//!
//! Destructive and all-or-nothing: the first failing command aborts the
//! install and nothing is rolled back. The caller must have confirmed the
//! target disk before calling `prepare`.

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use crate::{
    cmd::{Cmd, CommandRunner},
    config::{InstallConfig, EFI_PARTITION_SIZE, LUKS_MAPPING, SWAP_VOLUME_SIZE, VOLUME_GROUP},
    error::{InstallerError, Result},
    ui,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(1600);

// ── Capabilities ──────────────────────────────────────────────────────────────

pub trait PartitionManager {
    fn wipe(&mut self, disk: &Path) -> Result<()>;
    /// GPT with an EFI system partition and one partition for LUKS.
    fn create_layout(&mut self, disk: &Path) -> Result<()>;
    fn wait_for_partitions(&mut self, disk: &Path, partitions: &[&Path], timeout: Duration) -> Result<()>;
    fn format_ext4(&mut self, device: &Path, label: &str) -> Result<()>;
    fn format_fat32(&mut self, device: &Path, label: &str) -> Result<()>;
    fn format_swap(&mut self, device: &Path) -> Result<()>;
    fn mount(&mut self, device: &Path, target: &Path, options: Option<&str>) -> Result<()>;
    fn enable_swap(&mut self, device: &Path) -> Result<()>;
}

pub trait EncryptionManager {
    fn luks_format(&mut self, device: &Path) -> Result<()>;
    fn luks_open(&mut self, device: &Path, name: &str) -> Result<()>;
}

pub trait VolumeManager {
    fn create_volume_group(&mut self, physical: &Path, group: &str) -> Result<()>;
    /// `size` is an `lvcreate -L` size; `None` takes all remaining space.
    fn create_volume(&mut self, group: &str, name: &str, size: Option<&str>) -> Result<()>;
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

impl<R: CommandRunner + ?Sized> PartitionManager for R {
    fn wipe(&mut self, disk: &Path) -> Result<()> {
        let d = path_arg(disk);
        self.run_with_spinner(
            &Cmd::new("wipefs").args(["--all", "--force", &d]),
            &format!("Erasing filesystem signatures on {}…", d),
            &format!("Signatures erased on {}.", d),
        )?;
        self.run_with_spinner(
            &Cmd::new("sgdisk").args(["--zap-all", &d]),
            &format!("Zapping partition tables on {}…", d),
            "Partition tables zapped.",
        )
    }

    fn create_layout(&mut self, disk: &Path) -> Result<()> {
        let d = path_arg(disk);
        self.run_with_spinner(
            &Cmd::new("sgdisk").args([
                "--clear",
                &format!("--new=1:0:{}", EFI_PARTITION_SIZE),
                "--typecode=1:ef00",
                "--change-name=1:EFI",
                "--new=2:0:0",
                "--typecode=2:8309",
                &format!("--change-name=2:{}", LUKS_MAPPING),
                &d,
            ]),
            &format!("Writing GPT layout to {}…", d),
            &format!("GPT written: EFI ({}) + encrypted volume.", EFI_PARTITION_SIZE.trim_start_matches('+')),
        )
    }

    fn wait_for_partitions(&mut self, disk: &Path, partitions: &[&Path], timeout: Duration) -> Result<()> {
        if !self.run_best_effort(&Cmd::new("partprobe").arg(disk)) {
            tracing::warn!(disk = %disk.display(), "partprobe failed, relying on udev");
        }
        for part in partitions {
            wait_for_device(&*self, part, timeout)?;
        }
        ui::print_success("Partition nodes are ready.");
        Ok(())
    }

    fn format_ext4(&mut self, device: &Path, label: &str) -> Result<()> {
        let d = path_arg(device);
        self.run_with_spinner(
            &Cmd::new("mkfs.ext4").args(["-F", "-L", label, &d]),
            &format!("Formatting {} as ext4…", d),
            &format!("{} formatted as ext4.", d),
        )
    }

    fn format_fat32(&mut self, device: &Path, label: &str) -> Result<()> {
        let d = path_arg(device);
        self.run_with_spinner(
            &Cmd::new("mkfs.fat").args(["-F", "32", "-n", label, &d]),
            &format!("Formatting {} as FAT32…", d),
            &format!("{} formatted as FAT32.", d),
        )
    }

    fn format_swap(&mut self, device: &Path) -> Result<()> {
        let d = path_arg(device);
        self.run_with_spinner(
            &Cmd::new("mkswap").args(["-L", "swap", &d]),
            &format!("Initialising swap on {}…", d),
            &format!("{} initialised as swap.", d),
        )
    }

    fn mount(&mut self, device: &Path, target: &Path, options: Option<&str>) -> Result<()> {
        let mut cmd = Cmd::new("mount").arg("--mkdir");
        if let Some(o) = options {
            cmd = cmd.args(["-o", o]);
        }
        let cmd = cmd.arg(device).arg(target);
        self.run_with_spinner(
            &cmd,
            &format!("Mounting {} → {}…", device.display(), target.display()),
            &format!("{} mounted at {}.", device.display(), target.display()),
        )
    }

    fn enable_swap(&mut self, device: &Path) -> Result<()> {
        let d = path_arg(device);
        self.run_with_spinner(
            &Cmd::new("swapon").arg(&d),
            &format!("Activating swap on {}…", d),
            &format!("Swap on {} active.", d),
        )
    }
}

impl<R: CommandRunner + ?Sized> EncryptionManager for R {
    fn luks_format(&mut self, device: &Path) -> Result<()> {
        ui::print_info(&format!("Choose the disk encryption passphrase for {}.", device.display()));
        self.run_interactive(&Cmd::new("cryptsetup").args([
            "luksFormat",
            "--type",
            "luks2",
            "--cipher",
            "aes-xts-plain64",
            "--key-size",
            "512",
            "--hash",
            "sha512",
            "--pbkdf",
            "argon2id",
            "--sector-size",
            "4096",
            "--verify-passphrase",
            "--batch-mode",
            &path_arg(device),
        ]))?;
        ui::print_success("LUKS2 container created.");
        Ok(())
    }

    fn luks_open(&mut self, device: &Path, name: &str) -> Result<()> {
        ui::print_info("Unlock the new container to continue.");
        self.run_interactive(&Cmd::new("cryptsetup").args(["open", &path_arg(device), name]))?;
        ui::print_success(&format!("Opened as /dev/mapper/{}.", name));
        Ok(())
    }
}

impl<R: CommandRunner + ?Sized> VolumeManager for R {
    fn create_volume_group(&mut self, physical: &Path, group: &str) -> Result<()> {
        let p = path_arg(physical);
        self.run_with_spinner(
            &Cmd::new("pvcreate").arg(&p),
            &format!("Creating physical volume on {}…", p),
            "Physical volume created.",
        )?;
        self.run_with_spinner(
            &Cmd::new("vgcreate").args([group, &p]),
            &format!("Creating volume group {}…", group),
            &format!("Volume group {} created.", group),
        )
    }

    fn create_volume(&mut self, group: &str, name: &str, size: Option<&str>) -> Result<()> {
        let cmd = match size {
            Some(s) => Cmd::new("lvcreate").args(["--yes", "-L", s, "-n", name, group]),
            None => Cmd::new("lvcreate").args(["--yes", "-l", "100%FREE", "-n", name, group]),
        };
        self.run_with_spinner(
            &cmd,
            &format!("Creating logical volume {}/{}…", group, name),
            &format!("Logical volume {}/{} created ({}).", group, name, size.unwrap_or("remaining space")),
        )
    }
}

// ── Settle wait ───────────────────────────────────────────────────────────────

/// Polls for `path` with exponential backoff until it exists or `timeout`
/// elapses.
pub fn wait_for_device<R: CommandRunner + ?Sized>(runner: &R, path: &Path, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let mut delay = INITIAL_BACKOFF;

    loop {
        if runner.path_exists(path) {
            tracing::debug!(device = %path.display(), waited = ?start.elapsed(), "device ready");
            return Ok(());
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(InstallerError::DeviceTimeout(path.display().to_string()));
        }
        thread::sleep(delay.min(timeout - elapsed));
        delay = (delay * 2).min(MAX_BACKOFF);
    }
}

// ── Stage ─────────────────────────────────────────────────────────────────────

/// Undoes mounts and mappings left by an earlier failed attempt so the disk
/// can be reopened. Every step may fail harmlessly. The swap volume is
/// released whatever the current swap strategy.
fn release_previous_attempt<R: CommandRunner + ?Sized>(runner: &mut R, config: &InstallConfig) {
    runner.run_best_effort(&Cmd::new("umount").args(["-R"]).arg(&config.target_root));
    runner.run_best_effort(&Cmd::new("swapoff").arg(format!("/dev/{}/swap", VOLUME_GROUP)));
    runner.run_best_effort(&Cmd::new("vgchange").args(["-an", VOLUME_GROUP]));
    runner.run_best_effort(&Cmd::new("cryptsetup").args(["close", LUKS_MAPPING]));
}

pub fn prepare<R: CommandRunner + ?Sized>(runner: &mut R, config: &InstallConfig) -> Result<()> {
    tracing::info!(disk = %config.disk.path.display(), swap = ?config.swap, "preparing disk");
    release_previous_attempt(runner, config);

    runner.wipe(&config.disk.path)?;
    runner.create_layout(&config.disk.path)?;
    runner.wait_for_partitions(
        &config.disk.path,
        &[config.efi_partition.as_path(), config.root_partition.as_path()],
        config.settle_timeout,
    )?;

    runner.luks_format(&config.root_partition)?;
    runner.luks_open(&config.root_partition, LUKS_MAPPING)?;

    runner.create_volume_group(&config.mapper_path(), VOLUME_GROUP)?;
    if config.swap_volume().is_some() {
        runner.create_volume(VOLUME_GROUP, "swap", Some(SWAP_VOLUME_SIZE))?;
    }
    runner.create_volume(VOLUME_GROUP, "root", None)?;

    let root_volume = config.root_volume();
    runner.format_ext4(&root_volume, "root")?;
    runner.format_fat32(&config.efi_partition, "EFI")?;
    if let Some(swap) = config.swap_volume() {
        runner.format_swap(&swap)?;
    }

    runner.mount(&root_volume, &config.target_root, None)?;
    runner.mount(&config.efi_partition, &config.boot_dir(), Some("fmask=0077,dmask=0077"))?;
    if let Some(swap) = config.swap_volume() {
        runner.enable_swap(&swap)?;
    }

    Ok(())
}
