//! CPU capability query.
//!
//! On 32-bit ARM the kernel hands the hardware capabilities to the process in the
//! auxiliary vector; they are read once from `/proc/self/auxv` and cached for the
//! lifetime of the process. On any other target no register is populated and
//! every flag reads as disabled.

use std::mem::size_of;
use std::sync::OnceLock;

const AT_NULL: usize = 0;
const AT_PLATFORM: usize = 15;
const AT_HWCAP: usize = 16;
const AT_HWCAP2: usize = 26;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Register {
    Hwcap,
    Hwcap2,
    Platform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CpuFlag {
    Swp,
    Half,
    Thumb,
    A26Bit,
    FastMult,
    Fpa,
    Vfp,
    Edsp,
    Java,
    Iwmmxt,
    Crunch,
    ThumbEe,
    Neon,
    Vfpv3,
    Vfpv3D16,
    Tls,
    Vfpv4,
    Idiva,
    Idivt,
    Vfpd32,
    Lpae,
    Evtstrm,
    Aes,
    Pmull,
    Sha1,
    Sha2,
    Crc32,
    V7l,
}

impl CpuFlag {
    pub const COUNT: usize = 28;

    pub const ALL: [CpuFlag; CpuFlag::COUNT] = [
        CpuFlag::Swp,
        CpuFlag::Half,
        CpuFlag::Thumb,
        CpuFlag::A26Bit,
        CpuFlag::FastMult,
        CpuFlag::Fpa,
        CpuFlag::Vfp,
        CpuFlag::Edsp,
        CpuFlag::Java,
        CpuFlag::Iwmmxt,
        CpuFlag::Crunch,
        CpuFlag::ThumbEe,
        CpuFlag::Neon,
        CpuFlag::Vfpv3,
        CpuFlag::Vfpv3D16,
        CpuFlag::Tls,
        CpuFlag::Vfpv4,
        CpuFlag::Idiva,
        CpuFlag::Idivt,
        CpuFlag::Vfpd32,
        CpuFlag::Lpae,
        CpuFlag::Evtstrm,
        CpuFlag::Aes,
        CpuFlag::Pmull,
        CpuFlag::Sha1,
        CpuFlag::Sha2,
        CpuFlag::Crc32,
        CpuFlag::V7l,
    ];

    pub fn name(self) -> &'static str {
        FEATURE_TABLE[self as usize].name
    }
}

struct FeatureEntry {
    name: &'static str,
    reg: Register,
    bit: u32,
}

const fn feat(name: &'static str, reg: Register, bit: u32) -> FeatureEntry {
    FeatureEntry { name, reg, bit }
}

// Indexed by CpuFlag discriminant.
static FEATURE_TABLE: [FeatureEntry; CpuFlag::COUNT] = [
    feat("SWP", Register::Hwcap, 0),
    feat("HALF", Register::Hwcap, 1),
    feat("THUMB", Register::Hwcap, 2),
    feat("A26BIT", Register::Hwcap, 3),
    feat("FAST_MULT", Register::Hwcap, 4),
    feat("FPA", Register::Hwcap, 5),
    feat("VFP", Register::Hwcap, 6),
    feat("EDSP", Register::Hwcap, 7),
    feat("JAVA", Register::Hwcap, 8),
    feat("IWMMXT", Register::Hwcap, 9),
    feat("CRUNCH", Register::Hwcap, 10),
    feat("THUMBEE", Register::Hwcap, 11),
    feat("NEON", Register::Hwcap, 12),
    feat("VFPv3", Register::Hwcap, 13),
    feat("VFPv3D16", Register::Hwcap, 14),
    feat("TLS", Register::Hwcap, 15),
    feat("VFPv4", Register::Hwcap, 16),
    feat("IDIVA", Register::Hwcap, 17),
    feat("IDIVT", Register::Hwcap, 18),
    feat("VFPD32", Register::Hwcap, 19),
    feat("LPAE", Register::Hwcap, 20),
    feat("EVTSTRM", Register::Hwcap, 21),
    feat("AES", Register::Hwcap2, 0),
    feat("PMULL", Register::Hwcap2, 1),
    feat("SHA1", Register::Hwcap2, 2),
    feat("SHA2", Register::Hwcap2, 3),
    feat("CRC32", Register::Hwcap2, 4),
    feat("V7L", Register::Platform, 0),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    hwcap: usize,
    hwcap2: usize,
    platform: usize,
}

pub fn parse_auxv(bytes: &[u8]) -> impl Iterator<Item = (usize, usize)> + '_ {
    const WORD: usize = size_of::<usize>();
    bytes
        .chunks_exact(2 * WORD)
        .map(|entry| {
            let mut key = [0; WORD];
            let mut value = [0; WORD];
            key.copy_from_slice(&entry[..WORD]);
            value.copy_from_slice(&entry[WORD..]);
            (usize::from_ne_bytes(key), usize::from_ne_bytes(value))
        })
        .take_while(|&(key, _)| key != AT_NULL)
}

impl Registers {
    /// `platform_name` resolves the AT_PLATFORM value, which points at a string.
    pub fn from_auxv<I, F>(entries: I, platform_name: F) -> Registers
    where
        I: IntoIterator<Item = (usize, usize)>,
        F: Fn(usize) -> Option<String>,
    {
        let mut regs = Registers::default();
        for (key, value) in entries {
            match key {
                AT_HWCAP => regs.hwcap = value,
                AT_HWCAP2 => regs.hwcap2 = value,
                AT_PLATFORM => {
                    if platform_name(value).as_deref() == Some("v7l") {
                        regs.platform = 0x0001;
                    }
                }
                _ => {}
            }
        }
        regs
    }

    #[cfg(target_arch = "arm")]
    fn read() -> Registers {
        use std::ffi::CStr;

        let bytes = match std::fs::read("/proc/self/auxv") {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("cannot read /proc/self/auxv, reporting no CPU features: {}", e);
                return Registers::default();
            }
        };
        // AT_PLATFORM points into this process's own startup data, which lives forever
        Registers::from_auxv(parse_auxv(&bytes), |ptr| {
            if ptr == 0 {
                return None;
            }
            unsafe { CStr::from_ptr(ptr as *const libc::c_char) }.to_str().ok().map(String::from)
        })
    }

    #[cfg(not(target_arch = "arm"))]
    fn read() -> Registers {
        Registers::default()
    }

    pub fn is_enabled(&self, flag: CpuFlag) -> bool {
        let entry = &FEATURE_TABLE[flag as usize];
        let reg = match entry.reg {
            Register::Hwcap => self.hwcap,
            Register::Hwcap2 => self.hwcap2,
            Register::Platform => self.platform,
        };
        (reg >> entry.bit) & 1 == 1
    }
}

static REGISTERS: OnceLock<Registers> = OnceLock::new();

pub fn is_feature_enabled(flag: CpuFlag) -> bool {
    REGISTERS.get_or_init(Registers::read).is_enabled(flag)
}
