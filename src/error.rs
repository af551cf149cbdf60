use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{0}' failed with exit code {1}")]
    CommandFailed(String, i32),

    #[error("Command '{0}' not found. Is it installed?")]
    CommandNotFound(String),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root (sudo)")]
    NotRoot,

    #[error("System is not booted in UEFI mode ({0} does not exist)")]
    NotUefi(String),

    #[error("No network connectivity ({0}). Connect with iwctl or nmcli first")]
    Offline(String),

    #[error("'{0}' is not a block device")]
    NotBlockDevice(String),

    #[error("Timed out waiting for {0} to appear")]
    DeviceTimeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid initramfs hook order: {0}")]
    HookOrder(String),

    #[error(
        "Package installation failed with exit code {0}. \
         Check the network connection and /etc/pacman.d/mirrorlist, then retry"
    )]
    PackageInstall(i32),

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, InstallerError>;

impl InstallerError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_install_error_mentions_network() {
        let msg = InstallerError::PackageInstall(1).to_string();
        assert!(msg.contains("network"));
        assert!(msg.contains("mirrorlist"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: InstallerError = io.into();
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[test]
    fn command_failed_display() {
        let err = InstallerError::CommandFailed("sgdisk".into(), 4);
        assert_eq!(err.to_string(), "Command 'sgdisk' failed with exit code 4");
    }
}
