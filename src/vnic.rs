//! Hardware command interface of the vnic firmware, as consumed by this crate.
//!
//! Everything here is implemented by the control-plane layer that talks to the
//! adapter's devcmd registers; the device model only issues the calls.

use bitflags::bitflags;
use thiserror::Error;

use crate::enic::config::EnetConfig;
use crate::enic::fdir::FdirFilter;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VnicError {
    #[error("devcmd {cmd} failed with status {status}")]
    Command { cmd: &'static str, status: i32 },
    #[error("devcmd {cmd} timed out")]
    Timeout { cmd: &'static str },
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct PacketFilter: u32 {
        const DIRECTED = 1 << 0;
        const MULTICAST = 1 << 1;
        const BROADCAST = 1 << 2;
        const PROMISCUOUS = 1 << 3;
        const ALL_MULTICAST = 1 << 4;
    }
}

impl PacketFilter {
    pub fn from_modes(promisc: bool, allmulti: bool) -> PacketFilter {
        let mut filter = PacketFilter::DIRECTED | PacketFilter::MULTICAST | PacketFilter::BROADCAST;
        filter.set(PacketFilter::PROMISCUOUS, promisc);
        filter.set(PacketFilter::ALL_MULTICAST, allmulti);
        filter
    }
}

/// Completion queue and interrupt a work or receive queue is wired to.
/// `intr` is `None` for queues that are only polled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueBinding {
    pub cq_index: u16,
    pub intr: Option<u16>,
}

/// Resource counts as reported by the adapter's vNIC profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceCounts {
    pub wq: u16,
    pub rq: u16,
    pub cq: u16,
    pub intr: u16,
    pub filters: u16,
}

pub trait Vnic {
    fn mac_addr(&self) -> Result<[u8; 6], VnicError>;
    fn enet_config(&self) -> Result<EnetConfig, VnicError>;
    fn resource_counts(&self) -> ResourceCounts;

    fn enable_wq(&self, index: u16, binding: QueueBinding) -> Result<(), VnicError>;
    fn disable_wq(&self, index: u16) -> Result<(), VnicError>;
    fn enable_rq(&self, index: u16, binding: QueueBinding) -> Result<(), VnicError>;
    fn disable_rq(&self, index: u16) -> Result<(), VnicError>;

    fn link_status(&self) -> bool;
    fn set_packet_filter(&self, filter: PacketFilter) -> Result<(), VnicError>;

    fn classifier_add(&self, filter_id: u16, filter: &FdirFilter, rq: u16) -> Result<(), VnicError>;
    fn classifier_del(&self, filter_id: u16) -> Result<(), VnicError>;
}
