//! CPU, GPU and chassis detection.
//!
//! Detection runs once per install and only reads: `/proc/cpuinfo`, `lspci`
//! output and the DMI chassis type. Any source that is missing or unreadable
//! degrades to "unknown" / desktop without failing the run.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::cmd::{Cmd, CommandRunner};

/// DMI chassis types treated as portable: notebook, portable, laptop,
/// sub-notebook, convertible, detachable.
pub const PORTABLE_CHASSIS_CODES: [u8; 6] = [8, 9, 10, 14, 31, 32];

/// `lspci` class names of display controllers.
const DISPLAY_CLASSES: [&str; 3] = ["vga compatible controller", "3d controller", "display controller"];

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

impl CpuVendor {
    pub fn microcode_package(self) -> Option<&'static str> {
        match self {
            CpuVendor::Intel => Some("intel-ucode"),
            CpuVendor::Amd => Some("amd-ucode"),
            CpuVendor::Unknown => None,
        }
    }
}

impl fmt::Display for CpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuVendor::Intel => write!(f, "Intel"),
            CpuVendor::Amd => write!(f, "AMD"),
            CpuVendor::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl GpuVendor {
    /// Detection order; also the order driver sets are appended in.
    pub const ALL: [GpuVendor; 3] = [GpuVendor::Nvidia, GpuVendor::Amd, GpuVendor::Intel];

    fn keyword(self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chassis {
    Laptop,
    Desktop,
}

impl Chassis {
    pub fn is_laptop(self) -> bool {
        matches!(self, Chassis::Laptop)
    }
}

impl fmt::Display for Chassis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chassis::Laptop => write!(f, "laptop"),
            Chassis::Desktop => write!(f, "desktop"),
        }
    }
}

/// Aggregated detection result, threaded through the remaining stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareProfile {
    pub cpu: CpuVendor,
    /// Empty when nothing matched or GPU detection was not requested.
    pub gpus: Vec<GpuVendor>,
    pub chassis: Chassis,
}

impl HardwareProfile {
    pub fn has_gpu(&self, vendor: GpuVendor) -> bool {
        self.gpus.contains(&vendor)
    }

    pub fn gpu_summary(&self) -> String {
        if self.gpus.is_empty() {
            "generic".to_string()
        } else {
            self.gpus.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(" + ")
        }
    }
}

/// Where detection reads from. Overridable so tests can point at fixtures.
#[derive(Debug, Clone)]
pub struct Sources {
    pub cpuinfo: PathBuf,
    pub chassis_type: PathBuf,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
            chassis_type: PathBuf::from("/sys/class/dmi/id/chassis_type"),
        }
    }
}

// ── Pure classification ───────────────────────────────────────────────────────

pub fn cpu_vendor(cpuinfo: &str) -> CpuVendor {
    let vendor = cpuinfo
        .lines()
        .find(|l| l.starts_with("vendor_id"))
        .and_then(|l| l.split(':').nth(1))
        .map(str::trim);

    match vendor {
        Some("GenuineIntel") => CpuVendor::Intel,
        Some("AuthenticAMD") => CpuVendor::Amd,
        _ => CpuVendor::Unknown,
    }
}

/// Every vendor mentioned on any display-controller line, in `GpuVendor::ALL`
/// order. Hybrid systems yield more than one vendor.
pub fn gpu_vendors(lspci: &str) -> Vec<GpuVendor> {
    let display_lines: Vec<String> = lspci
        .lines()
        .map(str::to_lowercase)
        .filter(|l| DISPLAY_CLASSES.iter().any(|c| l.contains(c)))
        .collect();

    GpuVendor::ALL
        .into_iter()
        .filter(|v| display_lines.iter().any(|l| l.contains(v.keyword())))
        .collect()
}

/// Laptop iff the DMI code is one of `PORTABLE_CHASSIS_CODES`. `None` (no
/// source) and unparsable content are desktops.
pub fn classify_chassis(chassis_type: Option<&str>) -> Chassis {
    match chassis_type.and_then(|s| s.trim().parse::<u8>().ok()) {
        Some(code) if PORTABLE_CHASSIS_CODES.contains(&code) => Chassis::Laptop,
        _ => Chassis::Desktop,
    }
}

// ── Detection ─────────────────────────────────────────────────────────────────

/// Runs all probes once. GPU detection only happens for the gaming profile.
pub fn detect<R: CommandRunner + ?Sized>(runner: &mut R, sources: &Sources, detect_gpu: bool) -> HardwareProfile {
    let cpu = cpu_vendor(&read_source(runner, &sources.cpuinfo).unwrap_or_default());
    if cpu == CpuVendor::Unknown {
        tracing::warn!("unrecognised CPU vendor, no microcode package will be installed");
    }

    let gpus = if detect_gpu {
        match runner.run_capture(&Cmd::new("lspci")) {
            Ok(out) => gpu_vendors(&out),
            Err(e) => {
                tracing::warn!(error = %e, "lspci unavailable, using generic graphics drivers");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let chassis = classify_chassis(read_source(runner, &sources.chassis_type).as_deref());

    let profile = HardwareProfile { cpu, gpus, chassis };
    tracing::info!(
        cpu = %profile.cpu,
        gpu = %profile.gpu_summary(),
        chassis = %profile.chassis,
        "hardware detected"
    );
    profile
}

fn read_source<R: CommandRunner + ?Sized>(runner: &R, path: &Path) -> Option<String> {
    runner.read_file(path).ok()
}
