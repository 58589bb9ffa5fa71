//! Process-wide Vulkan loader
//!
//! The loader library is opened at most once per process. A failed load is
//! cached so every later call reports the same error instead of retrying.

use ash::Entry;
use std::sync::OnceLock;

use crate::error::{DriverError, DriverResult};

static ENTRY: OnceLock<Result<Entry, String>> = OnceLock::new();

/// Get the process-wide loader entry, loading it on first use
pub fn entry() -> DriverResult<&'static Entry> {
    ENTRY
        .get_or_init(|| {
            // SAFETY: the loader library stays loaded for the lifetime of the process
            unsafe { Entry::load() }.map_err(|e| format!("Failed to load Vulkan: {e}"))
        })
        .as_ref()
        .map_err(|message| DriverError::Initialization(message.clone()))
}

/// Whether a Vulkan loader is present on this machine
pub fn is_available() -> bool {
    entry().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_calls_agree() {
        let first = entry().map(|e| e as *const Entry);
        let second = entry().map(|e| e as *const Entry);
        match (first, second) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            _ => panic!("loader state changed between calls"),
        }
    }
}
