// Enable non-default lints
#![warn(future_incompatible)]
#![warn(nonstandard_style)]
#![warn(rust_2018_idioms)]
#![warn(unused)]

pub mod cpuflags;
pub mod enic;
pub mod env;
pub mod error;
pub mod pci;
pub mod registry;
pub mod vnic;

pub use enic::config::{DeviceConfig, EnetConfig, IntrMode, VenetFlags};
pub use enic::device::{Device, DeviceState};
pub use enic::fdir::{FdirFilter, FdirNode, FdirStats, FdirStatsSnapshot, FdirTable, L4Type};
pub use error::{Error, Result};
pub use pci::PciAddress;
pub use registry::{DeviceRegistry, Rejected};
pub use vnic::{PacketFilter, QueueBinding, ResourceCounts, Vnic, VnicError};
