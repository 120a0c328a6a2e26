// Completion queue numbering: receive queues take the low CQ indices, work queues follow them.
// The adapter routes completions by these indices, do not reorder.

use super::device_limits;

pub const ERR_INTR: u16 = 0;

pub const NOTIFY_INTR: u16 = 1;

pub const QUEUE_INTR_BASE: u16 = 2;

#[inline(always)]
pub const fn cq_rq(rq: u16) -> u16 {
    debug_assert!((rq as usize) < device_limits::RQ_MAX);
    rq
}

#[inline(always)]
pub const fn cq_wq(rq_count: u16, wq: u16) -> u16 {
    debug_assert!((rq_count as usize) <= device_limits::RQ_MAX);
    debug_assert!((wq as usize) < device_limits::WQ_MAX);
    rq_count + wq
}

#[inline(always)]
pub const fn msix_err_intr() -> u16 {
    ERR_INTR
}

// None means the CQ has no vector of its own and is only polled
#[inline(always)]
pub const fn queue_intr(cq: u16, intr_count: u16) -> Option<u16> {
    debug_assert!((cq as usize) < device_limits::CQ_MAX);
    let intr = QUEUE_INTR_BASE + cq;
    if intr < intr_count {
        Some(intr)
    } else {
        None
    }
}
