use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BluetoothAddress(u64);

const EXAMPLE_BLUETOOTH_ADDR: &str = "00:11:22:33:FF:EE";

impl BluetoothAddress {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Extracts the device address from a BlueZ object path such as
    /// `/org/bluez/hci0/dev_00_11_22_33_FF_EE` or any path below it.
    pub fn from_object_path(path: &str) -> Result<Self, Error> {
        static PATH_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"^(/[^/]+)*/hci[0-9]+/dev_(?P<device>(?:[0-9A-Fa-f]{2}_){5}[0-9A-Fa-f]{2})(/.*)?$"#)
                .expect("static regex")
        });

        let device = PATH_RE
            .captures(path)
            .and_then(|caps| caps.name("device"))
            .ok_or_else(|| Error::NotADevice(path.to_owned()))?;
        device.as_str().replace('_', ":").parse()
    }
}

impl From<u64> for BluetoothAddress {
    fn from(addr: u64) -> Self {
        Self(addr & 0xffff_ffff_ffff)
    }
}

impl std::str::FromStr for BluetoothAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != EXAMPLE_BLUETOOTH_ADDR.len() {
            return Err(Error::InvalidAddress(s.to_owned()));
        }

        let mut ret = 0;
        for segment in s.split(':') {
            if segment.len() != 2 || !segment.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::InvalidAddress(s.to_owned()));
            }
            let byte =
                u8::from_str_radix(segment, 16).map_err(|_| Error::InvalidAddress(s.to_owned()))?;
            ret <<= 8;
            ret |= u64::from(byte);
        }

        Ok(Self(ret))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..6).rev() {
            write!(f, "{:02X}", (self.0 >> (i * 8)) & 0xff)?;
            if i != 0 {
                f.write_str(":")?;
            }
        }

        Ok(())
    }
}
