//! # Platform-specific utilities
//!
//! Questo modulo descrive la piattaforma corrente come dati puri, senza
//! logica di ricerca: il `tool_resolver` usa questi valori per costruire
//! l'elenco delle directory vendor (`vendor/<platform>/<arch>`).
//!
//! ## Chiavi usate nel layout vendor:
//! - Piattaforma: `windows`, `macos`, `linux`
//! - Architettura: `x64`, `arm64`, oppure il nome grezzo di `std::env::consts::ARCH`

use std::fmt;

/// Operating system family as used in vendor directory names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the platform this binary was compiled for
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (`std::env::consts::OS` style) to a platform.
    /// Anything that is neither Windows nor macOS is treated as Linux.
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "macos" | "ios" => Self::MacOs,
            _ => Self::Linux,
        }
    }

    /// Directory key under `vendor/`
    pub fn key(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }

    /// Suffix appended to executable names
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            _ => "",
        }
    }
}

/// CPU architecture as used in vendor directory names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    Arm64,
    Other(String),
}

impl Arch {
    /// Detect the architecture this binary was compiled for
    pub fn current() -> Self {
        Self::from_arch(std::env::consts::ARCH)
    }

    /// Normalize the many spellings of the two common architectures
    pub fn from_arch(arch: &str) -> Self {
        let lower = arch.to_lowercase();
        match lower.as_str() {
            "x86_64" | "amd64" | "x64" => Self::X64,
            "aarch64" | "arm64" => Self::Arm64,
            _ => Self::Other(lower),
        }
    }

    /// Directory key under `vendor/<platform>/`
    pub fn key(&self) -> &str {
        match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::Other(name) => name,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub platform: Platform,
    pub arch: Arch,
    pub family: &'static str,
}

impl SystemInfo {
    /// Get system information for debugging
    pub fn current() -> Self {
        Self {
            platform: Platform::current(),
            arch: Arch::current(),
            family: std::env::consts::FAMILY,
        }
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.platform.key(), self.arch.key(), self.family)
    }
}
