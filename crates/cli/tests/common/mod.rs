//! Common utilities for integration tests

pub mod cli;
pub mod device;

// Re-export commonly used items
pub use device::MockDevice;

use std::fs;
use std::path::Path;

/// Write `content` at `name` under `root`, creating parent directories
pub fn write_file(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
