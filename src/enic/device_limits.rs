pub const WQ_MAX: usize = 8;

pub const RQ_MAX: usize = 8;

pub const CQ_MAX: usize = WQ_MAX + RQ_MAX;

// error + notify, then one per completion queue
pub const INTR_MAX: usize = CQ_MAX + 2;

pub const FDIR_MAX: usize = 64;

pub const MAX_MTU: u16 = 9000;
