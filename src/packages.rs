//! Package-set rules and final list assembly.
//!
//! The list handed to `pacstrap` is the concatenation of every included set,
//! in rule order. Duplicates are left in place; pacman resolves them.

use crate::{
    config::{Desktop, InstallConfig, SwapStrategy},
    hardware::{GpuVendor, HardwareProfile},
};

// ── Always-included sets ──────────────────────────────────────────────────────

pub const BASE: &[&str] = &["base", "base-devel", "linux-firmware", "sudo"];

pub const SYSTEM: &[&str] = &[
    "lvm2",
    "cryptsetup",
    "efibootmgr",
    "man-db",
    "man-pages",
    "pacman-contrib",
    "reflector",
];

pub const SECURITY: &[&str] = &["ufw", "apparmor"];

pub const NETWORK: &[&str] = &["networkmanager", "bluez", "bluez-utils", "openssh"];

pub const FILESYSTEM: &[&str] = &["dosfstools", "e2fsprogs", "exfatprogs", "ntfs-3g"];

pub const AUDIO: &[&str] = &[
    "pipewire",
    "pipewire-alsa",
    "pipewire-pulse",
    "pipewire-jack",
    "wireplumber",
];

pub const PRINT: &[&str] = &["cups", "cups-pdf", "system-config-printer"];

pub const FONTS: &[&str] = &["noto-fonts", "noto-fonts-emoji", "ttf-dejavu", "ttf-liberation"];

pub const APPS: &[&str] = &["firefox", "git", "vim", "htop", "docker", "docker-compose"];

// ── Conditional sets ──────────────────────────────────────────────────────────

pub const GPU_NVIDIA: &[&str] = &["nvidia-dkms", "nvidia-utils", "lib32-nvidia-utils", "nvidia-settings"];

pub const GPU_AMD: &[&str] = &["mesa", "lib32-mesa", "vulkan-radeon", "lib32-vulkan-radeon", "xf86-video-amdgpu"];

pub const GPU_INTEL: &[&str] = &["mesa", "lib32-mesa", "vulkan-intel", "lib32-vulkan-intel", "intel-media-driver"];

/// Used when no vendor matched or GPU detection was not requested.
pub const GPU_GENERIC: &[&str] = &["mesa", "mesa-utils"];

pub const DESKTOP_PLASMA: &[&str] = &["plasma-meta", "sddm", "konsole", "dolphin", "kate"];

pub const DESKTOP_GNOME: &[&str] = &["gnome", "gdm", "gnome-tweaks"];

pub const DESKTOP_XFCE: &[&str] = &["xfce4", "xfce4-goodies", "lightdm", "lightdm-gtk-greeter"];

pub const LAPTOP: &[&str] = &["power-profiles-daemon", "acpi", "acpid", "brightnessctl"];

pub const GAMING: &[&str] = &["steam", "gamemode", "lib32-gamemode", "mangohud", "lib32-mangohud"];

/// Swap-in-RAM replacement for a swap volume.
pub const ZRAM: &[&str] = &["zram-generator"];

/// Packages only available from the AUR, installed through the helper.
pub const AUR_BASE: &[&str] = &["visual-studio-code-bin"];

pub const AUR_GAMING: &[&str] = &["protonup-qt"];

pub fn gpu_set(vendor: GpuVendor) -> &'static [&'static str] {
    match vendor {
        GpuVendor::Nvidia => GPU_NVIDIA,
        GpuVendor::Amd => GPU_AMD,
        GpuVendor::Intel => GPU_INTEL,
    }
}

pub fn desktop_set(desktop: Desktop) -> &'static [&'static str] {
    match desktop {
        Desktop::Plasma => DESKTOP_PLASMA,
        Desktop::Gnome => DESKTOP_GNOME,
        Desktop::Xfce => DESKTOP_XFCE,
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// One named contribution to the final list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSet {
    pub name: &'static str,
    pub packages: Vec<&'static str>,
}

impl PackageSet {
    fn new(name: &'static str, packages: &[&'static str]) -> Self {
        Self {
            name,
            packages: packages.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSelection {
    sets: Vec<PackageSet>,
}

impl PackageSelection {
    /// Applies the inclusion rules in their fixed order.
    pub fn assemble(config: &InstallConfig, hw: &HardwareProfile) -> Self {
        let mut sets = vec![
            PackageSet::new("base", BASE),
            PackageSet::new("system", SYSTEM),
            PackageSet::new("security", SECURITY),
            PackageSet::new("network", NETWORK),
            PackageSet::new("filesystem", FILESYSTEM),
            PackageSet::new("audio", AUDIO),
            PackageSet::new("print", PRINT),
            PackageSet::new("fonts", FONTS),
            PackageSet::new("apps", APPS),
            PackageSet::new(
                "kernel",
                &[config.kernel.package_name(), config.kernel.headers_package()],
            ),
        ];

        if let Some(ucode) = hw.cpu.microcode_package() {
            sets.push(PackageSet::new("microcode", &[ucode]));
        }

        if hw.gpus.is_empty() {
            sets.push(PackageSet::new("gpu", GPU_GENERIC));
        } else {
            for vendor in &hw.gpus {
                sets.push(PackageSet::new("gpu", gpu_set(*vendor)));
            }
        }

        sets.push(PackageSet::new("desktop", desktop_set(config.desktop)));

        if hw.chassis.is_laptop() {
            sets.push(PackageSet::new("laptop", LAPTOP));
        }
        if config.gaming {
            sets.push(PackageSet::new("gaming", GAMING));
        }
        if config.swap == SwapStrategy::Zram {
            sets.push(PackageSet::new("zram", ZRAM));
        }

        Self { sets }
    }

    pub fn sets(&self) -> &[PackageSet] {
        &self.sets
    }

    /// Flat, order-stable list; duplicates preserved.
    pub fn packages(&self) -> Vec<&'static str> {
        self.sets.iter().flat_map(|s| s.packages.iter().copied()).collect()
    }

    pub fn contains(&self, package: &str) -> bool {
        self.sets.iter().any(|s| s.packages.iter().any(|p| *p == package))
    }

    /// 32-bit packages need the `[multilib]` repository enabled.
    pub fn needs_multilib(&self) -> bool {
        self.packages().iter().any(|p| p.starts_with("lib32-"))
    }
}

/// AUR-only packages for the helper to install after bootstrap.
pub fn aur_packages(config: &InstallConfig) -> Vec<&'static str> {
    let mut out = AUR_BASE.to_vec();
    if config.gaming {
        out.extend_from_slice(AUR_GAMING);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Answers, Localization, Secret};
    use crate::hardware::{Chassis, CpuVendor};

    fn config(gaming: bool, hibernate: bool, desktop: Desktop) -> InstallConfig {
        let answers = Answers {
            hostname: "box".into(),
            disk: "sda".into(),
            gaming,
            hibernate,
            desktop,
            aur_helper: false,
            username: "alice".into(),
            password: Secret::new("pw"),
        };
        InstallConfig::from_answers(answers, Localization::default(), "/mnt").unwrap()
    }

    fn desktop_hw() -> HardwareProfile {
        HardwareProfile {
            cpu: CpuVendor::Intel,
            gpus: vec![],
            chassis: Chassis::Desktop,
        }
    }

    #[test]
    fn kernel_follows_gaming_toggle() {
        let sel = PackageSelection::assemble(&config(false, false, Desktop::Plasma), &desktop_hw());
        assert!(sel.contains("linux") && sel.contains("linux-headers"));
        assert!(!sel.contains("linux-zen"));

        let sel = PackageSelection::assemble(&config(true, false, Desktop::Plasma), &desktop_hw());
        assert!(sel.contains("linux-zen") && sel.contains("linux-zen-headers"));
        assert!(sel.contains("steam"));
    }

    #[test]
    fn generic_graphics_without_detected_gpu() {
        let sel = PackageSelection::assemble(&config(false, false, Desktop::Gnome), &desktop_hw());
        let gpu: Vec<_> = sel.sets().iter().filter(|s| s.name == "gpu").collect();
        assert_eq!(gpu.len(), 1);
        assert_eq!(gpu[0].packages, GPU_GENERIC);
    }

    #[test]
    fn hybrid_gpu_gets_both_driver_sets() {
        let hw = HardwareProfile {
            gpus: vec![GpuVendor::Nvidia, GpuVendor::Intel],
            ..desktop_hw()
        };
        let sel = PackageSelection::assemble(&config(true, false, Desktop::Plasma), &hw);
        for p in GPU_NVIDIA.iter().chain(GPU_INTEL) {
            assert!(sel.contains(p), "missing {}", p);
        }
        assert!(!sel.contains("mesa-utils"));
        assert!(sel.needs_multilib());
    }

    #[test]
    fn duplicates_are_kept() {
        let hw = HardwareProfile {
            gpus: vec![GpuVendor::Amd, GpuVendor::Intel],
            ..desktop_hw()
        };
        let sel = PackageSelection::assemble(&config(true, false, Desktop::Xfce), &hw);
        let mesa = sel.packages().iter().filter(|p| **p == "mesa").count();
        assert_eq!(mesa, 2);
    }

    #[test]
    fn laptop_and_microcode() {
        let hw = HardwareProfile {
            cpu: CpuVendor::Amd,
            gpus: vec![],
            chassis: Chassis::Laptop,
        };
        let sel = PackageSelection::assemble(&config(false, true, Desktop::Plasma), &hw);
        assert!(sel.contains("amd-ucode"));
        assert!(sel.contains("power-profiles-daemon"));
        assert!(!sel.contains("zram-generator"));

        let hw = HardwareProfile { cpu: CpuVendor::Unknown, ..hw };
        let sel = PackageSelection::assemble(&config(false, true, Desktop::Plasma), &hw);
        assert!(!sel.sets().iter().any(|s| s.name == "microcode"));
    }

    #[test]
    fn non_gaming_generic_needs_no_multilib() {
        let sel = PackageSelection::assemble(&config(false, false, Desktop::Gnome), &desktop_hw());
        assert!(!sel.needs_multilib());
    }

    #[test]
    fn aur_list_follows_gaming() {
        assert_eq!(aur_packages(&config(false, false, Desktop::Gnome)), AUR_BASE);
        assert!(aur_packages(&config(true, false, Desktop::Gnome)).contains(&"protonup-qt"));
    }
}
