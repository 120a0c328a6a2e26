use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use log::debug;

use crate::enic::driver_constants::VFIO_PATH;
use crate::pci::PciAddress;

use super::environment::{Bar, DeviceHandles, Environment};

// _IO(VFIO_TYPE, VFIO_BASE + n), VFIO_TYPE is ';' and VFIO_BASE is 100
const VFIO_SET_IOMMU: libc::c_ulong = 0x3B66;
const VFIO_GROUP_SET_CONTAINER: libc::c_ulong = 0x3B68;
const VFIO_GROUP_GET_DEVICE_FD: libc::c_ulong = 0x3B6A;

const VFIO_TYPE1_IOMMU: libc::c_ulong = 1;

fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret)
}

pub fn eventfd() -> io::Result<OwnedFd> {
    let fd = check(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })?;
    // fd was just created and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn sysfs_path(addr: PciAddress, entry: &str) -> String {
    format!("/sys/bus/pci/devices/{}/{}", addr, entry)
}

fn open_rw(path: &str) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

pub struct LinuxEnvironment {}

impl LinuxEnvironment {
    pub fn new() -> LinuxEnvironment {
        LinuxEnvironment {}
    }

    fn iommu_group(&self, addr: PciAddress) -> io::Result<u32> {
        let link = fs::read_link(sysfs_path(addr, "iommu_group"))?;
        link.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad iommu_group link for {}", addr)))
    }
}

impl Default for LinuxEnvironment {
    fn default() -> Self {
        LinuxEnvironment::new()
    }
}

impl Environment for LinuxEnvironment {
    fn open_device(&self, addr: PciAddress) -> io::Result<DeviceHandles> {
        let group_id = self.iommu_group(addr)?;
        let container = open_rw(VFIO_PATH)?;
        let group = open_rw(&format!("/dev/vfio/{}", group_id))?;

        let container_fd: libc::c_int = container.as_raw_fd();
        unsafe {
            check(libc::ioctl(group.as_raw_fd(), VFIO_GROUP_SET_CONTAINER as _, &container_fd as *const libc::c_int))?;
            check(libc::ioctl(container_fd, VFIO_SET_IOMMU as _, VFIO_TYPE1_IOMMU))?;
        }

        let name = CString::new(addr.to_string())?;
        let device_fd = check(unsafe { libc::ioctl(group.as_raw_fd(), VFIO_GROUP_GET_DEVICE_FD as _, name.as_ptr()) })?;
        let device = unsafe { File::from_raw_fd(device_fd) };

        debug!("{}: VFIO group {} device fd {}", addr, group_id, device_fd);

        Ok(DeviceHandles { container, group, group_id, device, eventfd: eventfd()? })
    }

    fn map_bar0(&self, addr: PciAddress) -> io::Result<Bar> {
        let file = open_rw(&sysfs_path(addr, "resource0"))?;
        let map = unsafe { memmap::MmapOptions::new().map_mut(&file)? };
        Ok(Bar::new(map))
    }
}
