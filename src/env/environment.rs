use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;

use crate::pci::PciAddress;

/// Open handles that keep a VFIO-bound device usable; dropping them releases the device.
pub struct DeviceHandles {
    pub container: File,
    pub group: File,
    pub group_id: u32,
    pub device: File,
    pub eventfd: OwnedFd,
}

/// Mapped control-register region (BAR0).
pub struct Bar {
    map: memmap::MmapMut,
}

impl Bar {
    pub fn new(map: memmap::MmapMut) -> Bar {
        Bar { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn registers(&mut self) -> &mut [u32] {
        // mappings are page-aligned so there is no prefix
        let (_, regs, _) = unsafe { self.map.align_to_mut::<u32>() };
        regs
    }
}

pub trait Environment {
    fn open_device(&self, addr: PciAddress) -> io::Result<DeviceHandles>;
    fn map_bar0(&self, addr: PciAddress) -> io::Result<Bar>;
}
