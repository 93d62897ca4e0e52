// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Utilities for power-of-two sizing, path resolving
//! and a generation-checked object pool: objpool.rs

use std::{
    env,
    path::{Path, PathBuf},
};

pub mod objpool;

/// smallest power of two >= n, 1 for n == 0, None past 2^31
pub fn next_pot(n: u32) -> Option<u32> {
    n.max(1).checked_next_power_of_two()
}

pub fn is_pot(n: u32) -> bool {
    n != 0 && n.is_power_of_two()
}

/// Resolves a relative path against the working directory,
/// absolute paths are returned unchanged
pub fn get_abs_path(fpath: &str) -> String {
    let p = Path::new(fpath);
    if p.is_absolute() {
        return fpath.to_string();
    }
    let base = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    base.join(p).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pot() {
        assert_eq!(next_pot(0), Some(1));
        assert_eq!(next_pot(1), Some(1));
        assert_eq!(next_pot(3), Some(4));
        assert_eq!(next_pot(64), Some(64));
        assert_eq!(next_pot(100), Some(128));
        assert_eq!(next_pot(u32::MAX), None);
        assert!(is_pot(256));
        assert!(!is_pot(0));
        assert!(!is_pot(200));
    }

    #[test]
    fn test_abs_path() {
        assert_eq!(get_abs_path("/tmp/x.log"), "/tmp/x.log");
        assert!(Path::new(&get_abs_path("x.log")).is_absolute());
    }
}
