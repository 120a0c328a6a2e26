pub const DRV_NAME: &str = "enic_pmd";

pub const DRV_DESCRIPTION: &str = "Cisco VIC Ethernet NIC Poll-mode Driver";

pub const DRV_VERSION: &str = "1.0.0.4";

pub const PCI_VENDOR_ID_CISCO: u16 = 0x1137;

pub const PCI_DEVICE_ID_CISCO_VIC_ENET: u16 = 0x0043;

pub const PCI_DEVICE_ID_CISCO_VIC_ENET_VF: u16 = 0x0071;

pub const VFIO_PATH: &str = "/dev/vfio/vfio";

// "0000:00:00.0" plus the NUL the firmware side expects
pub const BDF_LENGTH: usize = 13;
