//! End-to-end runs of the execute phase against the recording runner.

use std::{path::Path, time::Duration};

use arch_installer::{
    config::{Answers, Desktop, InstallConfig, Localization, Secret},
    error::InstallerError,
    hardware::{self, Chassis, CpuVendor, Sources},
    packages::PackageSelection,
    recorder::{Event, Recorder},
    steps,
};

const CPUINFO: &str = "processor\t: 0\nvendor_id\t: AuthenticAMD\nmodel name\t: AMD Ryzen 7\n";
const LUKS_UUID: &str = "9f1c2d3e-aaaa-bbbb-cccc-0123456789ab";

fn answers() -> Answers {
    Answers {
        hostname: "box".into(),
        disk: "nvme0n1".into(),
        gaming: false,
        hibernate: false,
        desktop: Desktop::Plasma,
        aur_helper: false,
        username: "alice".into(),
        password: Secret::new("correct horse"),
    }
}

fn sources() -> Sources {
    Sources {
        cpuinfo: "/proc/cpuinfo".into(),
        chassis_type: "/sys/class/dmi/id/chassis_type".into(),
    }
}

fn recorder() -> Recorder {
    Recorder::new()
        .with_file("/proc/cpuinfo", CPUINFO)
        .with_file("/sys/class/dmi/id/chassis_type", "3\n")
        .with_file("/mnt/etc/locale.gen", "#en_US.UTF-8 UTF-8\n")
        .with_file("/mnt/etc/pacman.conf", "[options]\n#Color\n#ParallelDownloads = 5\n")
        .with_capture("blkid", LUKS_UUID)
        .with_capture(
            "genfstab",
            "UUID=1 / ext4 rw 0 1\nUUID=2 /boot vfat rw,fmask=0022,dmask=0022 0 2\n",
        )
}

#[test]
fn default_desktop_install_on_nvme() {
    let config = InstallConfig::from_answers(answers(), Localization::default(), "/mnt").unwrap();
    let mut runner = recorder();

    let hw = hardware::detect(&mut runner, &sources(), config.gaming);
    assert_eq!(hw.cpu, CpuVendor::Amd);
    assert_eq!(hw.chassis, Chassis::Desktop);
    assert!(hw.gpus.is_empty());
    assert!(!runner.ran("lspci"));

    let selection = PackageSelection::assemble(&config, &hw);
    steps::execute(&mut runner, &config, &hw, &selection).unwrap();

    // Partitions
    assert_eq!(config.efi_partition, Path::new("/dev/nvme0n1p1"));
    assert_eq!(config.root_partition, Path::new("/dev/nvme0n1p2"));
    assert!(runner.ran_line_containing("cryptsetup luksFormat --type luks2"));
    assert!(runner.ran_line_containing("cryptsetup open /dev/nvme0n1p2 cryptlvm"));
    assert!(runner.ran_line_containing("mkfs.fat -F 32 -n EFI /dev/nvme0n1p1"));

    // Packages
    let packages = selection.packages();
    assert!(packages.contains(&"linux"));
    assert!(packages.contains(&"linux-headers"));
    assert!(packages.contains(&"amd-ucode"));
    assert!(packages.contains(&"zram-generator"));
    assert!(packages.contains(&"sddm"));
    assert!(!packages.contains(&"linux-zen"));

    // zram, not a swap volume
    assert!(!runner.ran_line_containing("-n swap"));
    assert!(!runner.ran("swapon"));
    assert!(runner.file("/mnt/etc/systemd/zram-generator.conf").is_some());

    // Files
    assert_eq!(runner.file("/mnt/etc/hostname"), Some("box\n"));
    assert!(runner.file("/mnt/etc/pacman.conf").unwrap().contains("ParallelDownloads = 10"));
    assert!(runner.file("/mnt/etc/fstab").unwrap().contains("fmask=0077,dmask=0077"));
    let entry = runner.file("/mnt/boot/loader/entries/arch.conf").unwrap();
    assert!(entry.contains("linux   /vmlinuz-linux\n"));
    assert!(entry.contains(&format!("cryptdevice=UUID={}:cryptlvm", LUKS_UUID)));
    assert!(!entry.contains("resume="));

    // Chroot script removed after the run
    assert!(runner.file("/mnt/root/arch-installer-setup.sh").is_none());

    // Passwords only through stdin
    let chpasswd = runner
        .events
        .iter()
        .find_map(|e| match e {
            Event::WithInput(cmd, input) if cmd.to_string() == "arch-chroot /mnt chpasswd" => Some(input.as_str()),
            _ => None,
        })
        .unwrap();
    assert_eq!(chpasswd, "alice:correct horse\nroot:correct horse\n");
}

#[test]
fn stages_run_in_order() {
    let config = InstallConfig::from_answers(answers(), Localization::default(), "/mnt").unwrap();
    let mut runner = recorder();
    let hw = hardware::detect(&mut runner, &sources(), false);
    let selection = PackageSelection::assemble(&config, &hw);
    steps::execute(&mut runner, &config, &hw, &selection).unwrap();

    let lines = runner.command_lines();
    let at = |needle: &str| lines.iter().position(|l| l.starts_with(needle)).unwrap();
    assert!(at("wipefs") < at("cryptsetup luksFormat"));
    assert!(at("cryptsetup luksFormat") < at("pacstrap"));
    assert!(at("pacstrap") < at("genfstab"));
    assert!(at("genfstab") < at("arch-chroot /mnt /bin/bash"));
    assert!(at("arch-chroot /mnt /bin/bash") < at("arch-chroot /mnt chpasswd"));
    assert!(at("arch-chroot /mnt chpasswd") < at("blkid"));
}

#[test]
fn gaming_hibernate_laptop_with_hybrid_graphics() {
    let mut a = answers();
    a.disk = "/dev/sda".into();
    a.gaming = true;
    a.hibernate = true;
    a.aur_helper = true;
    let config = InstallConfig::from_answers(a, Localization::default(), "/mnt").unwrap();

    let mut runner = recorder()
        .with_file("/sys/class/dmi/id/chassis_type", "10\n")
        .with_capture(
            "lspci",
            "00:02.0 VGA compatible controller: Intel Corporation Iris Xe\n\
             01:00.0 3D controller: NVIDIA Corporation GA107M\n",
        );
    let hw = hardware::detect(&mut runner, &sources(), config.gaming);
    assert!(hw.chassis.is_laptop());
    assert_eq!(hw.gpu_summary(), "NVIDIA + Intel");

    let selection = PackageSelection::assemble(&config, &hw);
    steps::execute(&mut runner, &config, &hw, &selection).unwrap();

    assert_eq!(config.root_partition, Path::new("/dev/sda2"));
    assert!(runner.ran_line_containing("lvcreate --yes -L 16G -n swap vg0"));
    assert!(runner.ran_line_containing("swapon /dev/vg0/swap"));

    let packages = selection.packages();
    assert!(packages.contains(&"linux-zen"));
    assert!(packages.contains(&"linux-zen-headers"));
    assert!(packages.contains(&"nvidia-dkms"));
    assert!(packages.contains(&"vulkan-intel"));
    assert!(packages.contains(&"power-profiles-daemon"));
    assert!(!packages.contains(&"zram-generator"));

    assert!(runner.file("/mnt/etc/pacman.conf").unwrap().contains("\n[multilib]\n"));
    let entry = runner.file("/mnt/boot/loader/entries/arch.conf").unwrap();
    assert!(entry.contains("resume=/dev/vg0/swap"));
    assert!(entry.contains("nvidia_drm.modeset=1"));
    assert!(entry.contains("/vmlinuz-linux-zen"));
    assert!(runner.file("/mnt/etc/sudoers.d/99-arch-installer-aur").is_none());
}

#[test]
fn device_that_never_appears_aborts_before_encryption() {
    let mut config = InstallConfig::from_answers(answers(), Localization::default(), "/mnt").unwrap();
    config.settle_timeout = Duration::from_millis(200);
    let mut runner = recorder().without_devices();
    let hw = hardware::detect(&mut runner, &sources(), false);
    let selection = PackageSelection::assemble(&config, &hw);

    let err = steps::execute(&mut runner, &config, &hw, &selection).unwrap_err();
    assert!(matches!(err, InstallerError::DeviceTimeout(ref p) if p == "/dev/nvme0n1p1"));
    assert!(!runner.ran_line_containing("luksFormat"));
    assert!(!runner.ran("pacstrap"));
}
