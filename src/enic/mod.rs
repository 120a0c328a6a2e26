pub mod config;
pub mod device;
pub mod device_limits;
pub mod driver_constants;
pub mod fdir;
pub mod mapping;
pub mod queues;
