use std::io;

use thiserror::Error;

use crate::enic::device::DeviceState;
use crate::enic::queues::QueueKind;
use crate::pci::PciAddress;
use crate::vnic::VnicError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {resource} count {requested} exceeds limit {limit}")]
    InvalidConfiguration { resource: &'static str, requested: usize, limit: usize },
    #[error("hardware declined activation of {kind} {index}: {source}")]
    ResourceUnavailable {
        kind: QueueKind,
        index: u16,
        #[source]
        source: VnicError,
    },
    #[error("flow director table is full")]
    CapacityExceeded,
    #[error("an equal filter is already installed with id {existing}")]
    DuplicateKey { existing: u16 },
    #[error("filter mixes IPv4 and IPv6 addresses")]
    MixedAddressFamilies,
    #[error("no such filter")]
    NotFound,
    #[error("receive queue {rq} is out of range (rq_count {rq_count})")]
    InvalidQueue { rq: u16, rq_count: u16 },
    #[error("cannot {op} a device in state {state:?}")]
    InvalidState { op: &'static str, state: DeviceState },
    #[error("bad PCI address {0:?}, expected DDDD:BB:DD.F")]
    InvalidPciAddress(String),
    #[error("device {0} is already attached")]
    AlreadyAttached(PciAddress),
    #[error("vnic command failed: {0}")]
    Vnic(#[from] VnicError),
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
}
