//! Mount primitives.
//!
//! This module handles:
//! - Mount-point detection against the live mount table
//! - Mount option parsing
//! - Syscall and in-memory mount backends
//! - Helper-program fallback for filesystems the kernel cannot mount

mod error;
mod executor;
pub mod fake;
mod helper;
mod mounter;
mod options;
mod table;

pub use error::{MountError, capability_hint};
pub use executor::{MountExecutor, MountOutcome, MountRequest};
pub use helper::{ExecMountHelper, HelperInvocation, MountHelper};
pub use mounter::{Mounter, SyscallMounter};
pub use options::{MountOptions, flag_for};
pub use table::{MountTableReader, clean_path, parse_mount_points, unescape_mount_field};
