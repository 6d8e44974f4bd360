//! Mount option string parsing.

use rustix::mount::MountFlags;

/// Mount options split into kernel flags and free-form filesystem data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Flags passed to the mount syscall.
    pub flags: MountFlags,
    /// Tokens without a flag equivalent, in their original order.
    pub data: Vec<String>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            flags: MountFlags::empty(),
            data: Vec::new(),
        }
    }
}

impl MountOptions {
    /// Parse a comma-separated option string.
    ///
    /// Known tokens become flags, `rw` is a no-op, blank tokens are dropped
    /// and everything else is passed through verbatim as mount data.
    #[must_use]
    pub fn parse(options: &str) -> Self {
        let mut parsed = Self::default();

        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match flag_for(token) {
                Some(flag) => parsed.flags |= flag,
                None if token == "rw" => {}
                None => parsed.data.push(token.to_string()),
            }
        }

        parsed
    }

    /// Data tokens joined the way the kernel expects them.
    #[must_use]
    pub fn data_string(&self) -> String {
        self.data.join(",")
    }

    /// Whether the mount is requested read-only.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.flags.contains(MountFlags::RDONLY)
    }
}

/// Kernel flag for a recognised option token.
#[must_use]
pub fn flag_for(token: &str) -> Option<MountFlags> {
    match token {
        "ro" => Some(MountFlags::RDONLY),
        "nosuid" => Some(MountFlags::NOSUID),
        "nodev" => Some(MountFlags::NODEV),
        "noexec" => Some(MountFlags::NOEXEC),
        "noatime" => Some(MountFlags::NOATIME),
        "relatime" => Some(MountFlags::RELATIME),
        _ => None,
    }
}
