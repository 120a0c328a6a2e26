use std::fmt;
use std::fmt::Write;
use std::str::FromStr;

use crate::enic::driver_constants::BDF_LENGTH;
use crate::error::Error;

pub type BdfName = heapless::String<BDF_LENGTH>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub fn bdf_name(&self) -> BdfName {
        let mut name = BdfName::new();
        // never more than 13 characters even with out-of-range device/function fields
        let _ = write!(name, "{}", self);
        name
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:02x}:{:02x}.{:x}", self.domain, self.bus, self.device, self.function)
    }
}

fn hex_field<T>(part: &str, width: usize, parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>) -> Option<T> {
    if part.len() != width || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    parse(part, 16).ok()
}

impl FromStr for PciAddress {
    type Err = Error;

    // DDDD:BB:DD.F
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidPciAddress(s.to_string());

        let (rest, function) = s.rsplit_once('.').ok_or_else(bad)?;
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() != 3 {
            return Err(bad());
        }

        let domain = hex_field(parts[0], 4, u16::from_str_radix).ok_or_else(bad)?;
        let bus = hex_field(parts[1], 2, u8::from_str_radix).ok_or_else(bad)?;
        let device = hex_field(parts[2], 2, u8::from_str_radix).ok_or_else(bad)?;
        let function = hex_field(function, 1, u8::from_str_radix).ok_or_else(bad)?;
        if device > 0x1F || function > 0x7 {
            return Err(bad());
        }

        Ok(PciAddress { domain, bus, device, function })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_bdf() {
        let addr: PciAddress = "0000:0b:1f.7".parse().unwrap();
        assert_eq!(addr, PciAddress { domain: 0, bus: 0x0b, device: 0x1f, function: 7 });
        assert_eq!(addr.bdf_name().as_str(), "0000:0b:1f.7");
    }

    #[test]
    fn name_is_zero_padded() {
        let addr = PciAddress { domain: 0x12, bus: 3, device: 4, function: 5 };
        assert_eq!(addr.to_string(), "0012:03:04.5");
        assert_eq!(addr.bdf_name().len(), BDF_LENGTH - 1);
    }

    #[test]
    fn rejects_malformed() {
        for s in ["", "0b:00.0", "0000:0b:00", "0000:0b:00.8", "0000:0b:20.0", "000g:0b:00.0", "0000:0b:00.0.1", "00000:0b:00.0"] {
            assert!(matches!(s.parse::<PciAddress>(), Err(Error::InvalidPciAddress(_))), "{}", s);
        }
    }
}
