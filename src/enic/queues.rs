use std::fmt;

use crate::vnic::QueueBinding;

use super::device_limits::{CQ_MAX, RQ_MAX, WQ_MAX};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Wq,
    Rq,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Wq => write!(f, "WQ"),
            QueueKind::Rq => write!(f, "RQ"),
        }
    }
}

/// A work (transmit) or receive queue slot. The binding is derived on the first start
/// and kept across stop/start.
#[derive(Clone, Copy, Debug)]
pub struct Queue {
    pub kind: QueueKind,
    pub index: u16,
    pub binding: Option<QueueBinding>,
    pub enabled: bool,
}

impl Queue {
    fn new(kind: QueueKind, index: u16) -> Queue {
        Queue { kind, index, binding: None, enabled: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cq {
    pub index: u16,
    pub owner: (QueueKind, u16),
    pub intr: Option<u16>,
}

pub(crate) struct QueuePools {
    pub wq: heapless::Vec<Queue, WQ_MAX>,
    pub rq: heapless::Vec<Queue, RQ_MAX>,
    pub cq: heapless::Vec<Cq, CQ_MAX>,
    pub intr_count: u16,
}

impl QueuePools {
    pub(crate) fn empty() -> QueuePools {
        QueuePools { wq: heapless::Vec::new(), rq: heapless::Vec::new(), cq: heapless::Vec::new(), intr_count: 0 }
    }

    // Counts must already be validated against the capacities.
    pub(crate) fn sized(wq_count: u16, rq_count: u16, intr_count: u16) -> QueuePools {
        debug_assert!(wq_count as usize <= WQ_MAX && rq_count as usize <= RQ_MAX);
        debug_assert!((wq_count + rq_count) as usize <= CQ_MAX);

        let mut pools = QueuePools::empty();
        for n in 0..wq_count {
            let pushed = pools.wq.push(Queue::new(QueueKind::Wq, n));
            debug_assert!(pushed.is_ok());
        }
        for n in 0..rq_count {
            let pushed = pools.rq.push(Queue::new(QueueKind::Rq, n));
            debug_assert!(pushed.is_ok());
        }
        pools.intr_count = intr_count;
        pools
    }

    pub fn wq_count(&self) -> u16 {
        self.wq.len() as u16
    }

    pub fn rq_count(&self) -> u16 {
        self.rq.len() as u16
    }

    pub fn cq_count(&self) -> u16 {
        self.rq_count() + self.wq_count()
    }

    pub fn clear(&mut self) {
        self.wq.clear();
        self.rq.clear();
        self.cq.clear();
        self.intr_count = 0;
    }
}
