mod environment;
pub use environment::{Bar, DeviceHandles, Environment};

mod linux;
pub use linux::{eventfd, LinuxEnvironment};
