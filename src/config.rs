use std::{
    fmt,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{InstallerError, Result};

pub const DEFAULT_HOSTNAME: &str = "archlinux";

/// Name of the opened LUKS mapping under `/dev/mapper`.
pub const LUKS_MAPPING: &str = "cryptlvm";
pub const VOLUME_GROUP: &str = "vg0";

/// Size of the swap logical volume created when hibernation is chosen.
pub const SWAP_VOLUME_SIZE: &str = "16G";
pub const EFI_PARTITION_SIZE: &str = "+512M";

/// How long new partition nodes may take to appear after partitioning.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

// ── Secret ────────────────────────────────────────────────────────────────────

/// A password held only in memory. `Debug` never prints the value and there
/// is no `Display` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ── Kernel ────────────────────────────────────────────────────────────────────

/// Which Linux kernel variant to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    Stable,
    Zen,
}

impl KernelVariant {
    /// Gaming installs get the zen kernel, everything else the stable one.
    pub fn for_profile(gaming: bool) -> Self {
        if gaming {
            KernelVariant::Zen
        } else {
            KernelVariant::Stable
        }
    }

    /// The `pacstrap` package name for this variant.
    pub fn package_name(self) -> &'static str {
        match self {
            KernelVariant::Stable => "linux",
            KernelVariant::Zen => "linux-zen",
        }
    }

    pub fn headers_package(self) -> &'static str {
        match self {
            KernelVariant::Stable => "linux-headers",
            KernelVariant::Zen => "linux-zen-headers",
        }
    }

    /// Human-readable label shown to the user.
    pub fn display_name(self) -> &'static str {
        match self {
            KernelVariant::Stable => "Linux stable",
            KernelVariant::Zen => "Linux Zen (performance-optimized)",
        }
    }

    /// Kernel image path relative to the EFI partition.
    pub fn image(self) -> String {
        format!("/vmlinuz-{}", self.package_name())
    }

    pub fn initramfs(self, fallback: bool) -> String {
        if fallback {
            format!("/initramfs-{}-fallback.img", self.package_name())
        } else {
            format!("/initramfs-{}.img", self.package_name())
        }
    }
}

// ── Swap ──────────────────────────────────────────────────────────────────────

/// Hibernation needs a disk-backed swap volume; without it swap lives in
/// compressed RAM. The two are never combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStrategy {
    Zram,
    Hibernate,
}

impl SwapStrategy {
    pub fn from_hibernate(hibernate: bool) -> Self {
        if hibernate {
            SwapStrategy::Hibernate
        } else {
            SwapStrategy::Zram
        }
    }

    pub fn is_hibernate(self) -> bool {
        matches!(self, SwapStrategy::Hibernate)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SwapStrategy::Zram => "zram (compressed RAM)",
            SwapStrategy::Hibernate => "swap volume + hibernation",
        }
    }
}

// ── Desktop ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desktop {
    Plasma,
    Gnome,
    Xfce,
}

impl Desktop {
    pub const ALL: [Desktop; 3] = [Desktop::Plasma, Desktop::Gnome, Desktop::Xfce];

    pub fn display_name(self) -> &'static str {
        match self {
            Desktop::Plasma => "KDE Plasma",
            Desktop::Gnome => "GNOME",
            Desktop::Xfce => "Xfce",
        }
    }

    /// systemd unit of the login manager shipped with this desktop bundle.
    pub fn display_manager(self) -> &'static str {
        match self {
            Desktop::Plasma => "sddm",
            Desktop::Gnome => "gdm",
            Desktop::Xfce => "lightdm",
        }
    }
}

// ── Localization ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localization {
    pub timezone: String,
    pub locale: String,
    pub keymap: String,
}

impl Default for Localization {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            locale: "en_US.UTF-8".to_string(),
            keymap: "us".to_string(),
        }
    }
}

// ── Disk ──────────────────────────────────────────────────────────────────────

/// Target block device, e.g. name `nvme0n1`, path `/dev/nvme0n1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
    pub path: PathBuf,
}

impl Disk {
    /// Accepts `sda`, `/dev/sda` or ` sda ` and normalises to a `/dev` path.
    pub fn parse(input: &str) -> Result<Self> {
        let name = input.trim().trim_start_matches("/dev/").trim_matches('/');
        if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
            return Err(InstallerError::invalid_config(format!(
                "'{}' is not a disk name",
                input.trim()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(format!("/dev/{}", name)),
        })
    }

    pub fn partition(&self, index: u8) -> PathBuf {
        PathBuf::from(partition_path(&self.path.to_string_lossy(), index))
    }
}

/// Appends the partition index to a disk path. NVMe namespaces need a `p`
/// separator (`nvme0n1p1`), everything else takes the number directly.
pub fn partition_path(disk: &str, index: u8) -> String {
    let separator = if disk.contains("nvme") { "p" } else { "" };
    format!("{}{}{}", disk, separator, index)
}

pub fn is_block_device(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.file_type().is_block_device())
        .unwrap_or(false)
}

// ── Validation ────────────────────────────────────────────────────────────────

/// RFC 1123 label: 1-63 ASCII alphanumerics or `-`, not starting or ending
/// with `-`.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let ok = !hostname.is_empty()
        && hostname.len() <= 63
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(InstallerError::invalid_config(format!(
            "'{}' is not a valid hostname",
            hostname
        )))
    }
}

/// Same rules `useradd` applies by default, minus `root`.
pub fn validate_username(username: &str) -> Result<()> {
    let mut chars = username.chars();
    let ok = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && username.len() <= 32
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        }
        None => false,
    };
    if !ok {
        return Err(InstallerError::invalid_config(format!(
            "'{}' is not a valid username",
            username
        )));
    }
    if username == "root" {
        return Err(InstallerError::invalid_config("the user account cannot be root"));
    }
    Ok(())
}

// ── Collected answers ─────────────────────────────────────────────────────────

/// Raw values gathered by the prompt phase, before validation.
#[derive(Debug, Clone)]
pub struct Answers {
    pub hostname: String,
    pub disk: String,
    pub gaming: bool,
    pub hibernate: bool,
    pub desktop: Desktop,
    pub aur_helper: bool,
    pub username: String,
    pub password: Secret,
}

/// Holds all user-selected installation parameters. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub hostname: String,
    pub disk: Disk,
    pub efi_partition: PathBuf,
    pub root_partition: PathBuf,
    pub kernel: KernelVariant,
    pub gaming: bool,
    pub swap: SwapStrategy,
    pub desktop: Desktop,
    pub aur_helper: bool,
    pub username: String,
    pub password: Secret,
    pub localization: Localization,
    pub target_root: PathBuf,
    pub settle_timeout: Duration,
}

impl InstallConfig {
    pub fn from_answers(
        answers: Answers,
        localization: Localization,
        target_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let hostname = match answers.hostname.trim() {
            "" => DEFAULT_HOSTNAME.to_string(),
            h => h.to_string(),
        };
        validate_hostname(&hostname)?;

        let username = answers.username.trim().to_string();
        validate_username(&username)?;

        if answers.password.is_empty() {
            return Err(InstallerError::invalid_config("password must not be empty"));
        }

        let disk = Disk::parse(&answers.disk)?;

        Ok(Self {
            hostname,
            efi_partition: disk.partition(1),
            root_partition: disk.partition(2),
            disk,
            kernel: KernelVariant::for_profile(answers.gaming),
            gaming: answers.gaming,
            swap: SwapStrategy::from_hibernate(answers.hibernate),
            desktop: answers.desktop,
            aur_helper: answers.aur_helper,
            username,
            password: answers.password,
            localization,
            target_root: target_root.into(),
            settle_timeout: SETTLE_TIMEOUT,
        })
    }

    pub fn mapper_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/mapper/{}", LUKS_MAPPING))
    }

    pub fn root_volume(&self) -> PathBuf {
        PathBuf::from(format!("/dev/{}/root", VOLUME_GROUP))
    }

    /// The swap logical volume; only exists with hibernation.
    pub fn swap_volume(&self) -> Option<PathBuf> {
        self.swap
            .is_hibernate()
            .then(|| PathBuf::from(format!("/dev/{}/swap", VOLUME_GROUP)))
    }

    /// Resolves an absolute path inside the installed system,
    /// e.g. `/etc/hostname` → `/mnt/etc/hostname`.
    pub fn target(&self, path: &str) -> PathBuf {
        self.target_root.join(path.trim_start_matches('/'))
    }

    pub fn boot_dir(&self) -> PathBuf {
        self.target("/boot")
    }
}
