#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use enic_pmd::env::{self, Bar, DeviceHandles, Environment};
use enic_pmd::{EnetConfig, FdirFilter, L4Type, PacketFilter, PciAddress, QueueBinding, ResourceCounts, Vnic, VnicError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmd {
    EnableWq(u16, QueueBinding),
    DisableWq(u16),
    EnableRq(u16, QueueBinding),
    DisableRq(u16),
    PacketFilter(PacketFilter),
    ClsfAdd(u16, u16),
    ClsfDel(u16),
}

pub struct FakeVnic {
    pub counts: ResourceCounts,
    pub link: Cell<bool>,
    pub refuse_rq: Cell<Option<u16>>,
    pub refuse_clsf_del: Cell<bool>,
    pub refuse_disable: Cell<bool>,
    pub refuse_packet_filter: Cell<bool>,
    pub log: RefCell<Vec<Cmd>>,
}

impl FakeVnic {
    pub fn new() -> FakeVnic {
        FakeVnic::with_counts(ResourceCounts { wq: 8, rq: 8, cq: 16, intr: 18, filters: 64 })
    }

    pub fn with_counts(counts: ResourceCounts) -> FakeVnic {
        FakeVnic {
            counts,
            link: Cell::new(true),
            refuse_rq: Cell::new(None),
            refuse_clsf_del: Cell::new(false),
            refuse_disable: Cell::new(false),
            refuse_packet_filter: Cell::new(false),
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn take_log(&self) -> Vec<Cmd> {
        self.log.take()
    }

    fn record(&self, cmd: Cmd) {
        self.log.borrow_mut().push(cmd);
    }
}

impl Vnic for FakeVnic {
    fn mac_addr(&self) -> Result<[u8; 6], VnicError> {
        Ok([0x00, 0x25, 0xb5, 0x00, 0x00, 0x1f])
    }

    fn enet_config(&self) -> Result<EnetConfig, VnicError> {
        Ok(EnetConfig::default())
    }

    fn resource_counts(&self) -> ResourceCounts {
        self.counts
    }

    fn enable_wq(&self, index: u16, binding: QueueBinding) -> Result<(), VnicError> {
        self.record(Cmd::EnableWq(index, binding));
        Ok(())
    }

    fn disable_wq(&self, index: u16) -> Result<(), VnicError> {
        self.record(Cmd::DisableWq(index));
        if self.refuse_disable.get() {
            return Err(VnicError::Timeout { cmd: "WQ_DISABLE" });
        }
        Ok(())
    }

    fn enable_rq(&self, index: u16, binding: QueueBinding) -> Result<(), VnicError> {
        if self.refuse_rq.get() == Some(index) {
            return Err(VnicError::Command { cmd: "RQ_ENABLE", status: -16 });
        }
        self.record(Cmd::EnableRq(index, binding));
        Ok(())
    }

    fn disable_rq(&self, index: u16) -> Result<(), VnicError> {
        self.record(Cmd::DisableRq(index));
        if self.refuse_disable.get() {
            return Err(VnicError::Timeout { cmd: "RQ_DISABLE" });
        }
        Ok(())
    }

    fn link_status(&self) -> bool {
        self.link.get()
    }

    fn set_packet_filter(&self, filter: PacketFilter) -> Result<(), VnicError> {
        if self.refuse_packet_filter.get() {
            return Err(VnicError::Command { cmd: "PACKET_FILTER", status: -5 });
        }
        self.record(Cmd::PacketFilter(filter));
        Ok(())
    }

    fn classifier_add(&self, filter_id: u16, _filter: &FdirFilter, rq: u16) -> Result<(), VnicError> {
        self.record(Cmd::ClsfAdd(filter_id, rq));
        Ok(())
    }

    fn classifier_del(&self, filter_id: u16) -> Result<(), VnicError> {
        if self.refuse_clsf_del.get() {
            return Err(VnicError::Timeout { cmd: "CLSF_DEL" });
        }
        self.record(Cmd::ClsfDel(filter_id));
        Ok(())
    }
}

pub struct FakeEnvironment {}

fn null() -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open("/dev/null")
}

impl Environment for FakeEnvironment {
    fn open_device(&self, _addr: PciAddress) -> io::Result<DeviceHandles> {
        Ok(DeviceHandles { container: null()?, group: null()?, group_id: 42, device: null()?, eventfd: env::eventfd()? })
    }

    fn map_bar0(&self, _addr: PciAddress) -> io::Result<Bar> {
        Ok(Bar::new(memmap::MmapMut::map_anon(4096)?))
    }
}

pub fn addr(bus: u8) -> PciAddress {
    PciAddress { domain: 0, bus, device: 0, function: 0 }
}

pub fn tcp_to(port: u16) -> FdirFilter {
    FdirFilter {
        flex_bytes: 0,
        vlan_id: 0,
        port_src: 0,
        port_dst: port,
        ip_src: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)),
        ip_dst: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
        l4type: L4Type::Tcp,
    }
}
