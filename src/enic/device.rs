use std::sync::Arc;

use log::{debug, info, warn};

use crate::env::{Bar, DeviceHandles, Environment};
use crate::error::{Error, Result};
use crate::pci::{BdfName, PciAddress};
use crate::vnic::{PacketFilter, QueueBinding, ResourceCounts, Vnic, VnicError};

use super::config::{DeviceConfig, EnetConfig};
use super::device_limits::{CQ_MAX, INTR_MAX, RQ_MAX, WQ_MAX};
use super::fdir::{FdirFilter, FdirNode, FdirStats, FdirStatsSnapshot, FdirTable};
use super::mapping;
use super::queues::{Cq, Queue, QueueKind, QueuePools};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Configured,
    Started,
    Stopped,
    TornDown,
}

pub struct Device<V: Vnic> {
    addr: PciAddress,
    bdf_name: BdfName,
    mac_addr: [u8; 6],
    handles: Option<DeviceHandles>,
    bar0: Option<Bar>,
    vnic: V,
    config: EnetConfig,
    limits: ResourceCounts,

    state: DeviceState,
    pools: QueuePools,
    fdir: Option<FdirTable>,

    promisc: bool,
    allmulti: bool,
    ig_vlan_strip_en: bool,
    link_status: bool,
    hw_ip_checksum: bool,
}

fn check_limit(resource: &'static str, requested: usize, capacity: usize, reported: u16) -> Result<()> {
    let limit = capacity.min(reported as usize);
    if requested > limit {
        return Err(Error::InvalidConfiguration { resource, requested, limit });
    }
    Ok(())
}

fn enable(vnic: &impl Vnic, queue: &Queue, binding: QueueBinding) -> std::result::Result<(), VnicError> {
    match queue.kind {
        QueueKind::Wq => vnic.enable_wq(queue.index, binding),
        QueueKind::Rq => vnic.enable_rq(queue.index, binding),
    }
}

fn disable(vnic: &impl Vnic, queue: &Queue) -> std::result::Result<(), VnicError> {
    match queue.kind {
        QueueKind::Wq => vnic.disable_wq(queue.index),
        QueueKind::Rq => vnic.disable_rq(queue.index),
    }
}

impl<V: Vnic> Device<V> {
    pub fn attach(env: &impl Environment, addr: PciAddress, vnic: V) -> Result<Device<V>> {
        let handles = env.open_device(addr)?;
        let bar0 = env.map_bar0(addr)?;
        let mac_addr = vnic.mac_addr()?;
        let config = vnic.enet_config()?;
        let limits = vnic.resource_counts();

        info!(
            "{}: attached, mac {:02x?}, mtu {}, wq {} rq {} cq {} intr {}",
            addr,
            mac_addr,
            config.mtu(),
            limits.wq,
            limits.rq,
            limits.cq,
            limits.intr
        );

        Ok(Device {
            addr,
            bdf_name: addr.bdf_name(),
            mac_addr,
            handles: Some(handles),
            bar0: Some(bar0),
            vnic,
            hw_ip_checksum: config.checksum_offload(),
            config,
            limits,
            state: DeviceState::Uninitialized,
            pools: QueuePools::empty(),
            fdir: None,
            promisc: false,
            allmulti: false,
            ig_vlan_strip_en: false,
            link_status: false,
        })
    }

    fn expect_state(&self, op: &'static str, allowed: &[DeviceState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState { op, state: self.state })
        }
    }

    pub fn configure(&mut self, config: DeviceConfig) -> Result<()> {
        self.expect_state("configure", &[DeviceState::Uninitialized])?;

        let wq_count = config.wq_count as usize;
        let rq_count = config.rq_count as usize;
        check_limit("WQ", wq_count, WQ_MAX, self.limits.wq)?;
        check_limit("RQ", rq_count, RQ_MAX, self.limits.rq)?;
        check_limit("CQ", wq_count + rq_count, CQ_MAX, self.limits.cq)?;

        let cq_count = config.wq_count + config.rq_count;
        let intr_count = (cq_count + 2).min(INTR_MAX as u16).min(self.limits.intr);

        self.pools = QueuePools::sized(config.wq_count, config.rq_count, intr_count);
        self.fdir = Some(FdirTable::with_capacity(self.limits.filters as usize));
        self.state = DeviceState::Configured;

        info!("{}: configured wq {} rq {} cq {} intr {}", self.addr, config.wq_count, config.rq_count, cq_count, intr_count);
        Ok(())
    }

    // Derives every queue's CQ and interrupt once; later starts reuse what is stored here.
    fn bind_queues(&mut self) {
        let rq_count = self.pools.rq_count();
        let intr_count = self.pools.intr_count;
        self.pools.cq.clear();

        for rq in self.pools.rq.iter_mut() {
            let cq_index = mapping::cq_rq(rq.index);
            rq.binding = Some(QueueBinding { cq_index, intr: mapping::queue_intr(cq_index, intr_count) });
        }
        for wq in self.pools.wq.iter_mut() {
            let cq_index = mapping::cq_wq(rq_count, wq.index);
            wq.binding = Some(QueueBinding { cq_index, intr: mapping::queue_intr(cq_index, intr_count) });
        }

        // CQs are ordered by index since RQs come first
        for queue in self.pools.rq.iter().chain(self.pools.wq.iter()) {
            if let Some(binding) = queue.binding {
                let pushed = self.pools.cq.push(Cq { index: binding.cq_index, owner: (queue.kind, queue.index), intr: binding.intr });
                debug_assert!(pushed.is_ok(), "more queues than completion queues");
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[DeviceState::Configured, DeviceState::Stopped])?;

        if self.state == DeviceState::Configured {
            self.bind_queues();
        }

        // the state is left alone on failure, so a stopped device stays stopped
        let started = self.enable_queues().and_then(|()| self.push_packet_filter(self.promisc, self.allmulti));
        if let Err(e) = started {
            warn!("{}: start failed, rolling back: {}", self.addr, e);
            self.roll_back();
            return Err(e);
        }

        self.state = DeviceState::Started;
        self.link_status = self.vnic.link_status();
        info!("{}: started, link {}", self.addr, if self.link_status { "up" } else { "down" });
        Ok(())
    }

    fn enable_queues(&mut self) -> Result<()> {
        for queue in self.pools.rq.iter_mut().chain(self.pools.wq.iter_mut()) {
            let Some(binding) = queue.binding else {
                continue;
            };
            enable(&self.vnic, queue, binding)
                .map_err(|source| Error::ResourceUnavailable { kind: queue.kind, index: queue.index, source })?;
            queue.enabled = true;
        }
        Ok(())
    }

    fn roll_back(&mut self) {
        for queue in self.pools.rq.iter_mut().chain(self.pools.wq.iter_mut()).filter(|q| q.enabled) {
            if let Err(e) = disable(&self.vnic, queue) {
                warn!("{}: could not disable {} {} during rollback: {}", self.addr, queue.kind, queue.index, e);
            }
            queue.enabled = false;
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", &[DeviceState::Started])?;

        let mut first_error = None;
        for queue in self.pools.wq.iter_mut().chain(self.pools.rq.iter_mut()).filter(|q| q.enabled) {
            if let Err(e) = disable(&self.vnic, queue) {
                warn!("{}: failed to disable {} {}: {}", self.addr, queue.kind, queue.index, e);
                first_error.get_or_insert(e);
            }
            queue.enabled = false;
        }

        self.state = DeviceState::Stopped;
        info!("{}: stopped", self.addr);
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn teardown(&mut self) {
        if self.state == DeviceState::TornDown {
            return;
        }
        if self.state == DeviceState::Started {
            if let Err(e) = self.stop() {
                warn!("{}: stop during teardown: {}", self.addr, e);
            }
        }
        if let Some(fdir) = self.fdir.take() {
            fdir.drain(&self.vnic);
        }

        self.pools.clear();
        self.bar0 = None;
        self.handles = None;
        self.state = DeviceState::TornDown;
        info!("{}: torn down", self.addr);
    }

    fn push_packet_filter(&self, promisc: bool, allmulti: bool) -> Result<()> {
        let filter = PacketFilter::from_modes(promisc, allmulti);
        debug!("{}: packet filter {:?}", self.addr, filter);
        self.vnic.set_packet_filter(filter)?;
        Ok(())
    }

    // Modes are recorded unless the adapter refuses them; it only hears about them while started.
    pub fn set_promiscuous(&mut self, enable: bool) -> Result<()> {
        if self.state == DeviceState::Started {
            self.push_packet_filter(enable, self.allmulti)?;
        }
        self.promisc = enable;
        Ok(())
    }

    pub fn set_all_multicast(&mut self, enable: bool) -> Result<()> {
        if self.state == DeviceState::Started {
            self.push_packet_filter(self.promisc, enable)?;
        }
        self.allmulti = enable;
        Ok(())
    }

    pub fn set_vlan_strip(&mut self, enable: bool) {
        self.ig_vlan_strip_en = enable;
    }

    /// Polls the adapter and returns whether the link changed.
    pub fn update_link_status(&mut self) -> bool {
        let link = self.vnic.link_status();
        if link == self.link_status {
            return false;
        }
        self.link_status = link;
        info!("{}: link {}", self.addr, if link { "up" } else { "down" });
        true
    }

    fn fdir_for(&self, op: &'static str) -> Result<&FdirTable> {
        self.fdir.as_ref().ok_or(Error::InvalidState { op, state: self.state })
    }

    pub fn add_filter(&self, filter: FdirFilter, rq: u16) -> Result<u16> {
        let fdir = self.fdir_for("add a filter to")?;
        let rq_count = self.pools.rq_count();
        if rq >= rq_count {
            return Err(Error::InvalidQueue { rq, rq_count });
        }
        fdir.add(filter, rq, &self.vnic)
    }

    pub fn delete_filter(&self, fltr_id: u16) -> Result<()> {
        self.fdir_for("delete a filter from")?.delete(fltr_id, &self.vnic)
    }

    pub fn delete_filter_by_key(&self, filter: &FdirFilter) -> Result<u16> {
        self.fdir_for("delete a filter from")?.delete_by_key(filter, &self.vnic)
    }

    pub fn lookup_filter(&self, filter: &FdirFilter) -> Result<u16> {
        self.fdir_for("look up a filter on")?.lookup(filter)
    }

    pub fn filter_count(&self) -> usize {
        self.fdir.as_ref().map_or(0, FdirTable::len)
    }

    pub fn filters(&self) -> Vec<FdirNode> {
        self.fdir.as_ref().map(FdirTable::filters).unwrap_or_default()
    }

    /// Counters for the receive path to record matches on. `None` until configured.
    pub fn fdir_stats_handle(&self) -> Option<Arc<FdirStats>> {
        self.fdir.as_ref().map(FdirTable::stats_handle)
    }

    pub fn fdir_stats(&self) -> FdirStatsSnapshot {
        self.fdir.as_ref().map(FdirTable::stats).unwrap_or_default()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn pci_address(&self) -> PciAddress {
        self.addr
    }

    pub fn bdf_name(&self) -> &str {
        self.bdf_name.as_str()
    }

    pub fn mac_addr(&self) -> [u8; 6] {
        self.mac_addr
    }

    pub fn enet_config(&self) -> &EnetConfig {
        &self.config
    }

    pub fn handles(&self) -> Option<&DeviceHandles> {
        self.handles.as_ref()
    }

    pub fn bar0(&mut self) -> Option<&mut Bar> {
        self.bar0.as_mut()
    }

    pub fn vnic(&self) -> &V {
        &self.vnic
    }

    pub fn wq_count(&self) -> u16 {
        self.pools.wq_count()
    }

    pub fn rq_count(&self) -> u16 {
        self.pools.rq_count()
    }

    pub fn cq_count(&self) -> u16 {
        self.pools.cq_count()
    }

    pub fn intr_count(&self) -> u16 {
        self.pools.intr_count
    }

    pub fn wq(&self) -> &[Queue] {
        &self.pools.wq
    }

    pub fn rq(&self) -> &[Queue] {
        &self.pools.rq
    }

    pub fn cq(&self) -> &[Cq] {
        &self.pools.cq
    }

    pub fn promiscuous(&self) -> bool {
        self.promisc
    }

    pub fn all_multicast(&self) -> bool {
        self.allmulti
    }

    pub fn vlan_strip(&self) -> bool {
        self.ig_vlan_strip_en
    }

    pub fn link_up(&self) -> bool {
        self.link_status
    }

    pub fn checksum_offload(&self) -> bool {
        self.hw_ip_checksum
    }
}

impl<V: Vnic> Drop for Device<V> {
    fn drop(&mut self) {
        self.teardown();
    }
}
