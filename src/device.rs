//! Block-device naming and resolution.

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, prelude::*},
    str::FromStr,
};

use thiserror::Error;

static PARTITIONS_PATH: &str = "/proc/partitions";

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("reading {path} failed")]
    ReadFile {
        #[source]
        source: io::Error,
        path: String,
    },
    #[error("block device {0} not found")]
    NotFound(String),
    #[error("{0} is not a valid device identifier")]
    Malformed(String),
}

/// Identifier of a block device: the `(major, minor)` number pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for DeviceId {
    type Err = DeviceError;

    /// Parses the `major:minor` form, e.g. `8:3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DeviceError::Malformed(s.to_string());
        let (major, minor) = s.split_once(':').ok_or_else(|| malformed())?;
        Ok(DeviceId {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

/// Collaborator turning an operator-supplied device name into a [`DeviceId`].
pub trait ResolveDevice {
    fn resolve(&self, name: &str) -> Result<DeviceId, DeviceError>;
}

/// Resolver backed by the kernel partition table.
pub struct PartitionTable;

impl ResolveDevice for PartitionTable {
    fn resolve(&self, name: &str) -> Result<DeviceId, DeviceError> {
        let file = File::open(PARTITIONS_PATH).map_err(|source| DeviceError::ReadFile {
            source,
            path: PARTITIONS_PATH.to_owned(),
        })?;
        parse_partitions(BufReader::new(file), name)
    }
}

/// Looks `name` up in a `/proc/partitions` listing. Each data row carries
/// four fields:
///
/// ```ignore
/// major minor  #blocks  name
///    8        0  488386584 sda
/// ```
///
/// The header row and blank separator are skipped by the field-count check.
fn parse_partitions<R>(reader: BufReader<R>, name: &str) -> Result<DeviceId, DeviceError>
where
    R: Read,
{
    for line in reader.lines().map_while(Result::ok) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 || fields[0] == "major" {
            continue;
        }
        if fields[3] == name {
            if let (Ok(major), Ok(minor)) = (fields[0].parse(), fields[1].parse()) {
                return Ok(DeviceId { major, minor });
            }
        }
    }

    Err(DeviceError::NotFound(name.to_owned()))
}
