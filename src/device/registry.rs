//! Labelled device ranges owned by a session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use getset::{CopyGetters, Getters};
use log::info;

use super::{FileDevice, RangedDevice, SegmentedDevice};
use crate::error::{Result, XfsError};

/// Device the registry hands out: a range over one or more image files.
pub type ImageDevice = RangedDevice<SegmentedDevice<FileDevice>>;

/// Where a labelled volume lives: the image segments and a byte range inside them.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct RangeConfig {
    /// Segments of the image, in order; a plain image has one
    #[get = "pub"]
    paths: Vec<PathBuf>,
    #[getset(get_copy = "pub")]
    offset: i64,
    #[getset(get_copy = "pub")]
    size: u64,
}

impl RangeConfig {
    pub fn new(path: &Path, offset: i64, size: u64) -> Self {
        Self::segmented(vec![path.to_path_buf()], offset, size)
    }

    pub fn segmented(paths: Vec<PathBuf>, offset: i64, size: u64) -> Self {
        RangeConfig {
            paths,
            offset,
            size,
        }
    }

    /// Builds a closed device for this range, named `name`.
    ///
    /// # Errors
    /// `Argument` if there are no segments or the range is invalid.
    pub fn device(&self, name: &str) -> Result<ImageDevice> {
        let mut device = RangedDevice::new(SegmentedDevice::from_paths(&self.paths)?);
        device.set_name(name);
        device.configure(self.offset, self.size)?;
        Ok(device)
    }
}

/// Maps labels to device ranges.
///
/// Entries outlive the volumes opened from them: closing a volume leaves its
/// label registered.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    ranges: BTreeMap<String, RangeConfig>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `config` under `label`.
    ///
    /// # Errors
    /// `Runtime` if the label is already in use.
    pub fn register(&mut self, label: &str, config: RangeConfig) -> Result<()> {
        if self.ranges.contains_key(label) {
            return Err(XfsError::Runtime(format!(
                "label {label} is already registered"
            )));
        }
        let first = config.paths.first().map(|path| path.display().to_string());
        info!(
            "Registered {label} -> {} ({} segments, offset {}, size {})",
            first.unwrap_or_default(),
            config.paths.len(),
            config.offset,
            config.size
        );
        self.ranges.insert(label.to_string(), config);
        Ok(())
    }

    /// Removes `label`, returning its configuration if it was registered.
    pub fn unregister(&mut self, label: &str) -> Option<RangeConfig> {
        self.ranges.remove(label)
    }

    pub fn get(&self, label: &str) -> Option<&RangeConfig> {
        self.ranges.get(label)
    }

    /// Registered labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    /// Builds a closed, configured device for `label`.
    ///
    /// # Errors
    /// `Argument` if the label is unknown or its range is invalid.
    pub fn device(&self, label: &str) -> Result<ImageDevice> {
        self.ranges
            .get(label)
            .ok_or_else(|| XfsError::Argument(format!("unknown label {label}")))?
            .device(label)
    }
}
