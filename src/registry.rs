use std::fmt;

use log::info;

use crate::enic::device::Device;
use crate::error::{Error, Result};
use crate::pci::PciAddress;
use crate::vnic::Vnic;

/// A device the registry refused, handed back untouched.
pub struct Rejected<V: Vnic> {
    pub error: Error,
    pub device: Device<V>,
}

impl<V: Vnic> fmt::Debug for Rejected<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).field("device", &self.device.pci_address()).finish()
    }
}

/// Every device the driver currently has attached, in attach order.
pub struct DeviceRegistry<V: Vnic> {
    devices: Vec<Device<V>>,
}

impl<V: Vnic> DeviceRegistry<V> {
    pub fn new() -> DeviceRegistry<V> {
        DeviceRegistry { devices: Vec::new() }
    }

    fn position(&self, addr: PciAddress) -> Option<usize> {
        self.devices.iter().position(|d| d.pci_address() == addr)
    }

    pub fn contains(&self, addr: PciAddress) -> bool {
        self.position(addr).is_some()
    }

    /// Takes ownership of an attached device, returning its index. A device whose
    /// address is already registered is returned in the error without being torn down.
    pub fn attach(&mut self, device: Device<V>) -> std::result::Result<usize, Rejected<V>> {
        let addr = device.pci_address();
        if self.contains(addr) {
            return Err(Rejected { error: Error::AlreadyAttached(addr), device });
        }
        self.devices.push(device);
        Ok(self.devices.len() - 1)
    }

    pub fn get(&self, addr: PciAddress) -> Option<&Device<V>> {
        self.position(addr).map(|n| &self.devices[n])
    }

    pub fn get_mut(&mut self, addr: PciAddress) -> Option<&mut Device<V>> {
        let n = self.position(addr)?;
        self.devices.get_mut(n)
    }

    pub fn by_index(&self, index: usize) -> Option<&Device<V>> {
        self.devices.get(index)
    }

    /// Tears the device down and forgets it.
    pub fn detach(&mut self, addr: PciAddress) -> Result<()> {
        let n = self.position(addr).ok_or(Error::NotFound)?;
        let mut device = self.devices.remove(n);
        device.teardown();
        info!("{}: detached", addr);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device<V>> {
        self.devices.iter()
    }
}

impl<V: Vnic> Default for DeviceRegistry<V> {
    fn default() -> Self {
        DeviceRegistry::new()
    }
}
