//! Flow director filter table.
//!
//! Installed filters live in a fixed array of slots indexed by filter id, with a
//! fixed-capacity hash index from match specification to id on the side. Both are
//! behind one lock, which is also held across the classifier devcmd, so a reader
//! never sees a slot without its index entry or the other way around.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use heapless::index_map::FnvIndexMap;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::vnic::Vnic;

use super::device_limits::FDIR_MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum L4Type {
    None,
    Udp,
    Tcp,
    Sctp,
}

/// Match specification of a flow director filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FdirFilter {
    pub flex_bytes: u16,
    pub vlan_id: u16,
    pub port_src: u16,
    pub port_dst: u16,
    pub ip_src: IpAddr,
    pub ip_dst: IpAddr,
    pub l4type: L4Type,
}

impl FdirFilter {
    pub fn is_ipv6(&self) -> bool {
        self.ip_src.is_ipv6()
    }

    // the adapter matches one IP type per filter
    pub fn has_mixed_families(&self) -> bool {
        self.ip_src.is_ipv6() != self.ip_dst.is_ipv6()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FdirNode {
    pub filter: FdirFilter,
    pub fltr_id: u16,
    pub rq_index: u16,
}

/// Counters shared with the receive path, which bumps `matched` on its own.
#[derive(Debug, Default)]
pub struct FdirStats {
    add: AtomicU32,
    remove: AtomicU32,
    f_add: AtomicU32,
    f_remove: AtomicU32,
    free: AtomicU32,
    matched: AtomicU32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FdirStatsSnapshot {
    pub add: u32,
    pub remove: u32,
    pub f_add: u32,
    pub f_remove: u32,
    pub free: u32,
    pub matched: u32,
}

impl FdirStats {
    pub fn record_match(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FdirStatsSnapshot {
        FdirStatsSnapshot {
            add: self.add.load(Ordering::Relaxed),
            remove: self.remove.load(Ordering::Relaxed),
            f_add: self.f_add.load(Ordering::Relaxed),
            f_remove: self.f_remove.load(Ordering::Relaxed),
            free: self.free.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Slots {
    nodes: [Option<FdirNode>; FDIR_MAX],
    index: FnvIndexMap<FdirFilter, u16, FDIR_MAX>,
}

pub struct FdirTable {
    slots: Mutex<Slots>,
    capacity: usize,
    stats: Arc<FdirStats>,
}

impl FdirTable {
    pub fn new() -> FdirTable {
        FdirTable::with_capacity(FDIR_MAX)
    }

    // The adapter may report fewer classifier entries than the driver supports.
    pub fn with_capacity(capacity: usize) -> FdirTable {
        let capacity = capacity.min(FDIR_MAX);
        let stats = Arc::new(FdirStats::default());
        stats.free.store(capacity as u32, Ordering::Relaxed);
        FdirTable {
            slots: Mutex::new(Slots { nodes: [None; FDIR_MAX], index: FnvIndexMap::new() }),
            capacity,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add(&self, filter: FdirFilter, rq: u16, vnic: &impl Vnic) -> Result<u16> {
        if filter.has_mixed_families() {
            FdirStats::bump(&self.stats.f_add);
            return Err(Error::MixedAddressFamilies);
        }

        let mut slots = self.slots.lock();

        if let Some(&existing) = slots.index.get(&filter) {
            FdirStats::bump(&self.stats.f_add);
            return Err(Error::DuplicateKey { existing });
        }

        let Some(free) = slots.nodes[..self.capacity].iter().position(Option::is_none) else {
            FdirStats::bump(&self.stats.f_add);
            return Err(Error::CapacityExceeded);
        };
        let fltr_id = free as u16;

        if let Err(e) = vnic.classifier_add(fltr_id, &filter, rq) {
            warn!("fdir: classifier add for slot {} failed, not committing: {}", fltr_id, e);
            FdirStats::bump(&self.stats.f_add);
            return Err(e.into());
        }

        // cannot fail, the index holds at most one entry per slot and has as many entries as slots
        if slots.index.insert(filter, fltr_id).is_err() {
            return Err(Error::CapacityExceeded);
        }
        slots.nodes[free] = Some(FdirNode { filter, fltr_id, rq_index: rq });

        FdirStats::bump(&self.stats.add);
        self.stats.free.fetch_sub(1, Ordering::Relaxed);
        debug!("fdir: added filter {} -> rq {}", fltr_id, rq);
        Ok(fltr_id)
    }

    pub(crate) fn delete(&self, fltr_id: u16, vnic: &impl Vnic) -> Result<()> {
        let mut slots = self.slots.lock();
        Self::delete_locked(&mut slots, &self.stats, fltr_id, vnic)
    }

    pub(crate) fn delete_by_key(&self, filter: &FdirFilter, vnic: &impl Vnic) -> Result<u16> {
        let mut slots = self.slots.lock();
        let fltr_id = match slots.index.get(filter) {
            Some(&id) => id,
            None => {
                FdirStats::bump(&self.stats.f_remove);
                return Err(Error::NotFound);
            }
        };
        Self::delete_locked(&mut slots, &self.stats, fltr_id, vnic)?;
        Ok(fltr_id)
    }

    fn delete_locked(slots: &mut Slots, stats: &FdirStats, fltr_id: u16, vnic: &impl Vnic) -> Result<()> {
        let node = match slots.nodes.get(fltr_id as usize).copied().flatten() {
            Some(node) => node,
            None => {
                FdirStats::bump(&stats.f_remove);
                return Err(Error::NotFound);
            }
        };

        // the slot stays claimed until the adapter confirms the removal
        if let Err(e) = vnic.classifier_del(fltr_id) {
            FdirStats::bump(&stats.f_remove);
            return Err(e.into());
        }

        slots.index.remove(&node.filter);
        slots.nodes[fltr_id as usize] = None;

        FdirStats::bump(&stats.remove);
        stats.free.fetch_add(1, Ordering::Relaxed);
        debug!("fdir: deleted filter {}", fltr_id);
        Ok(())
    }

    pub fn lookup(&self, filter: &FdirFilter) -> Result<u16> {
        self.slots.lock().index.get(filter).copied().ok_or(Error::NotFound)
    }

    pub fn get(&self, fltr_id: u16) -> Option<FdirNode> {
        self.slots.lock().nodes.get(fltr_id as usize).copied().flatten()
    }

    pub fn filters(&self) -> Vec<FdirNode> {
        self.slots.lock().nodes.iter().flatten().copied().collect()
    }

    pub fn stats(&self) -> FdirStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<FdirStats> {
        Arc::clone(&self.stats)
    }

    /// Removes every installed filter for teardown. Failures are logged and the
    /// table ends up empty regardless.
    pub(crate) fn drain(&self, vnic: &impl Vnic) {
        let mut slots = self.slots.lock();
        for n in 0..FDIR_MAX {
            if slots.nodes[n].is_none() {
                continue;
            }
            if let Err(e) = Self::delete_locked(&mut slots, &self.stats, n as u16, vnic) {
                warn!("fdir: failed to delete filter {} during teardown: {}", n, e);
            }
        }
        slots.nodes = [None; FDIR_MAX];
        slots.index.clear();
        self.stats.free.store(self.capacity as u32, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let slots = self.slots.lock();
        let occupied = slots.nodes.iter().flatten().count();
        occupied == slots.index.len()
            && slots.nodes.iter().enumerate().all(|(n, node)| match node {
                Some(node) => node.fltr_id as usize == n && slots.index.get(&node.filter) == Some(&node.fltr_id),
                None => true,
            })
            && slots.index.iter().all(|(filter, &id)| slots.nodes[id as usize].map(|n| n.filter) == Some(*filter))
    }
}

impl Default for FdirTable {
    fn default() -> Self {
        FdirTable::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;
    use crate::enic::config::EnetConfig;
    use crate::vnic::{PacketFilter, QueueBinding, ResourceCounts, VnicError};

    #[derive(Default)]
    struct Classifier {
        installed: RefCell<Vec<u16>>,
        fail_add: Cell<bool>,
        fail_del: Cell<bool>,
    }

    impl Vnic for Classifier {
        fn mac_addr(&self) -> std::result::Result<[u8; 6], VnicError> {
            Ok([0; 6])
        }
        fn enet_config(&self) -> std::result::Result<EnetConfig, VnicError> {
            Ok(EnetConfig::default())
        }
        fn resource_counts(&self) -> ResourceCounts {
            ResourceCounts { wq: 8, rq: 8, cq: 16, intr: 18, filters: 64 }
        }
        fn enable_wq(&self, _: u16, _: QueueBinding) -> std::result::Result<(), VnicError> {
            Ok(())
        }
        fn disable_wq(&self, _: u16) -> std::result::Result<(), VnicError> {
            Ok(())
        }
        fn enable_rq(&self, _: u16, _: QueueBinding) -> std::result::Result<(), VnicError> {
            Ok(())
        }
        fn disable_rq(&self, _: u16) -> std::result::Result<(), VnicError> {
            Ok(())
        }
        fn link_status(&self) -> bool {
            true
        }
        fn set_packet_filter(&self, _: PacketFilter) -> std::result::Result<(), VnicError> {
            Ok(())
        }
        fn classifier_add(&self, filter_id: u16, _: &FdirFilter, _: u16) -> std::result::Result<(), VnicError> {
            if self.fail_add.get() {
                return Err(VnicError::Command { cmd: "CLSF_ADD", status: -5 });
            }
            self.installed.borrow_mut().push(filter_id);
            Ok(())
        }
        fn classifier_del(&self, filter_id: u16) -> std::result::Result<(), VnicError> {
            if self.fail_del.get() {
                return Err(VnicError::Command { cmd: "CLSF_DEL", status: -5 });
            }
            self.installed.borrow_mut().retain(|&id| id != filter_id);
            Ok(())
        }
    }

    fn udp_to(port: u16) -> FdirFilter {
        FdirFilter {
            flex_bytes: 0,
            vlan_id: 0,
            port_src: 0,
            port_dst: port,
            ip_src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ip_dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            l4type: L4Type::Udp,
        }
    }

    #[test]
    fn add_then_lookup_then_delete() {
        let vnic = Classifier::default();
        let table = FdirTable::new();

        let id = table.add(udp_to(53), 1, &vnic).unwrap();
        assert_eq!(id, 0);
        assert_eq!(table.lookup(&udp_to(53)).unwrap(), id);
        assert_eq!(table.get(id).map(|n| n.rq_index), Some(1));
        assert_eq!(*vnic.installed.borrow(), vec![0]);

        table.delete(id, &vnic).unwrap();
        assert!(matches!(table.lookup(&udp_to(53)), Err(Error::NotFound)));
        assert!(vnic.installed.borrow().is_empty());
        assert!(table.is_consistent());
    }

    #[test]
    fn lowest_free_slot_is_reused() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        for port in 0..4 {
            assert_eq!(table.add(udp_to(port), 0, &vnic).unwrap(), port);
        }

        table.delete(1, &vnic).unwrap();
        table.delete(2, &vnic).unwrap();
        assert_eq!(table.add(udp_to(100), 0, &vnic).unwrap(), 1);
        assert_eq!(table.add(udp_to(101), 0, &vnic).unwrap(), 2);
        assert_eq!(table.add(udp_to(102), 0, &vnic).unwrap(), 4);
        assert!(table.is_consistent());
    }

    #[test]
    fn duplicate_is_rejected() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        table.add(udp_to(80), 2, &vnic).unwrap();

        assert!(matches!(table.add(udp_to(80), 3, &vnic), Err(Error::DuplicateKey { existing: 0 })));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).map(|n| n.rq_index), Some(2));
    }

    #[test]
    fn sixty_fifth_add_exceeds_capacity() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        for port in 0..FDIR_MAX as u16 {
            table.add(udp_to(port), 0, &vnic).unwrap();
        }

        assert!(matches!(table.add(udp_to(1000), 0, &vnic), Err(Error::CapacityExceeded)));
        assert_eq!(table.len(), FDIR_MAX);
        assert_eq!(table.stats().free, 0);
        assert!(table.is_consistent());
    }

    #[test]
    fn reported_capacity_limits_slots() {
        let vnic = Classifier::default();
        let table = FdirTable::with_capacity(2);
        table.add(udp_to(1), 0, &vnic).unwrap();
        table.add(udp_to(2), 0, &vnic).unwrap();
        assert!(matches!(table.add(udp_to(3), 0, &vnic), Err(Error::CapacityExceeded)));

        assert_eq!(FdirTable::with_capacity(1000).capacity(), FDIR_MAX);
    }

    #[test]
    fn double_delete_is_not_found() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        let id = table.add(udp_to(7), 0, &vnic).unwrap();
        table.add(udp_to(8), 0, &vnic).unwrap();

        table.delete(id, &vnic).unwrap();
        assert!(matches!(table.delete(id, &vnic), Err(Error::NotFound)));
        assert!(matches!(table.delete(FDIR_MAX as u16, &vnic), Err(Error::NotFound)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats().f_remove, 2);
    }

    #[test]
    fn hardware_failure_leaves_table_unchanged() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        table.add(udp_to(1), 0, &vnic).unwrap();

        vnic.fail_add.set(true);
        assert!(matches!(table.add(udp_to(2), 0, &vnic), Err(Error::Vnic(_))));
        assert!(matches!(table.lookup(&udp_to(2)), Err(Error::NotFound)));
        assert_eq!(table.len(), 1);
        vnic.fail_add.set(false);

        vnic.fail_del.set(true);
        assert!(matches!(table.delete(0, &vnic), Err(Error::Vnic(_))));
        assert_eq!(table.lookup(&udp_to(1)).unwrap(), 0);
        assert!(table.is_consistent());

        // the failed add did not burn the slot
        vnic.fail_del.set(false);
        assert_eq!(table.add(udp_to(2), 0, &vnic).unwrap(), 1);
    }

    #[test]
    fn mixed_address_families_are_rejected() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        let filter = FdirFilter { ip_dst: IpAddr::V6(Ipv6Addr::LOCALHOST), ..udp_to(9) };

        assert!(matches!(table.add(filter, 0, &vnic), Err(Error::MixedAddressFamilies)));
        assert!(table.is_empty());
        assert!(vnic.installed.borrow().is_empty());

        let v6 = FdirFilter { ip_src: IpAddr::V6(Ipv6Addr::UNSPECIFIED), ..filter };
        assert!(v6.is_ipv6());
        assert_eq!(table.add(v6, 0, &vnic).unwrap(), 0);
    }

    #[test]
    fn delete_by_key_resolves_id() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        table.add(udp_to(1), 0, &vnic).unwrap();
        table.add(udp_to(2), 0, &vnic).unwrap();

        assert_eq!(table.delete_by_key(&udp_to(2), &vnic).unwrap(), 1);
        assert!(matches!(table.delete_by_key(&udp_to(2), &vnic), Err(Error::NotFound)));
        assert_eq!(table.filters().len(), 1);
    }

    #[test]
    fn mixed_sequence_stays_consistent() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        let mut live = Vec::new();
        // deterministic walk that both fills the table and punches holes in it
        for step in 0u16..500 {
            let port = step.wrapping_mul(37) % 97;
            if step % 3 == 2 && !live.is_empty() {
                let id = live.remove((step as usize * 7) % live.len());
                table.delete(id, &vnic).unwrap();
            } else {
                match table.add(udp_to(port), 0, &vnic) {
                    Ok(id) => live.push(id),
                    Err(Error::DuplicateKey { .. }) | Err(Error::CapacityExceeded) => {}
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
            assert!(table.is_consistent());
            assert_eq!(table.len(), live.len());
        }
    }

    #[test]
    fn drain_empties_even_when_hardware_refuses() {
        let vnic = Classifier::default();
        let table = FdirTable::new();
        for port in 0..5 {
            table.add(udp_to(port), 0, &vnic).unwrap();
        }

        vnic.fail_del.set(true);
        table.drain(&vnic);
        assert!(table.is_empty());
        assert!(table.is_consistent());
    }

    #[test]
    fn matches_come_from_the_shared_handle() {
        let table = FdirTable::new();
        let handle = table.stats_handle();
        handle.record_match();
        handle.record_match();
        assert_eq!(table.stats().matched, 2);
        assert_eq!(table.stats().free, FDIR_MAX as u32);
    }
}
