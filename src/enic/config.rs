use bitflags::bitflags;

use super::device_limits;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct VenetFlags: u32 {
        const TSO = 0x1;
        const LRO = 0x2;
        const RXCSUM = 0x4;
        const TXCSUM = 0x8;
        const RSS = 0x10;
        const RSSHASH_IPV4 = 0x20;
        const RSSHASH_TCPIPV4 = 0x40;
        const RSSHASH_IPV6 = 0x80;
        const RSSHASH_TCPIPV6 = 0x100;
        const RSSHASH_IPV6_EX = 0x200;
        const RSSHASH_TCPIPV6_EX = 0x400;
        const LOOP = 0x800;
        const VXLAN = 0x10000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrMode {
    Any,
    Msix,
    Msi,
    Intx,
}

/// vNIC profile settings as provisioned on the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnetConfig {
    pub flags: VenetFlags,
    pub wq_desc_count: u32,
    pub rq_desc_count: u32,
    pub mtu: u16,
    pub intr_mode: IntrMode,
}

impl EnetConfig {
    pub fn is_set(&self, flag: VenetFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn checksum_offload(&self) -> bool {
        self.is_set(VenetFlags::RXCSUM | VenetFlags::TXCSUM)
    }

    pub fn mtu(&self) -> u16 {
        self.mtu.min(device_limits::MAX_MTU)
    }
}

impl Default for EnetConfig {
    fn default() -> Self {
        EnetConfig {
            flags: VenetFlags::RXCSUM | VenetFlags::TXCSUM,
            wq_desc_count: 512,
            rq_desc_count: 512,
            mtu: 1500,
            intr_mode: IntrMode::Msix,
        }
    }
}

/// Queue counts requested by the surrounding driver at configure time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub wq_count: u16,
    pub rq_count: u16,
}
