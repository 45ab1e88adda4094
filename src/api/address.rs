//! Hardware address used to tell discovered devices apart.

use std::borrow::Borrow;
use std::fmt::{self, Debug, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};
#[cfg(feature = "serde")]
use serde_cr as serde;

/// The address a radio reports for a remote device.
///
/// Platforms hand addresses over as strings and some report identifiers that are not 6 byte MACs,
/// so the address is kept as reported. Strings that do spell a MAC (`aa:bb:cc:dd:ee:ff`,
/// `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`, any case) are stored in the upper case colon form, so
/// two spellings of the same MAC compare equal.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct DeviceAddress(String);

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ParseAddressError {
    #[error("device address has to be 6 bytes long, got {0:?}")]
    WrongLength(String),
    #[error("invalid hex digit in device address {0:?}")]
    InvalidDigit(String),
}

impl DeviceAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 6 octets of the address, if it is a MAC.
    pub fn octets(&self) -> Result<[u8; 6], ParseAddressError> {
        parse_mac(&self.0)
    }
}

fn parse_mac(s: &str) -> Result<[u8; 6], ParseAddressError> {
    if s.contains(':') {
        parse_octets(s, s.split(':'))
    } else if s.contains('-') {
        parse_octets(s, s.split('-'))
    } else if s.len() == 12 && s.is_ascii() {
        parse_octets(s, (0..6).map(|i| &s[i * 2..i * 2 + 2]))
    } else {
        Err(ParseAddressError::WrongLength(s.to_owned()))
    }
}

fn parse_octets<'a>(
    raw: &str,
    parts: impl Iterator<Item = &'a str>,
) -> Result<[u8; 6], ParseAddressError> {
    let mut octets = [0u8; 6];
    let mut count = 0;
    for part in parts {
        if count == octets.len() || part.len() != 2 {
            return Err(ParseAddressError::WrongLength(raw.to_owned()));
        }
        if !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseAddressError::InvalidDigit(raw.to_owned()));
        }
        octets[count] = u8::from_str_radix(part, 16)
            .map_err(|_| ParseAddressError::InvalidDigit(raw.to_owned()))?;
        count += 1;
    }
    if count != octets.len() {
        return Err(ParseAddressError::WrongLength(raw.to_owned()));
    }
    Ok(octets)
}

fn format_mac([a, b, c, d, e, g]: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        a, b, c, d, e, g
    )
}

impl From<&str> for DeviceAddress {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        match parse_mac(raw) {
            Ok(octets) => DeviceAddress(format_mac(octets)),
            Err(_) => DeviceAddress(raw.to_owned()),
        }
    }
}

impl From<String> for DeviceAddress {
    fn from(raw: String) -> Self {
        DeviceAddress::from(raw.as_str())
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(octets: [u8; 6]) -> Self {
        DeviceAddress(format_mac(octets))
    }
}

impl AsRef<str> for DeviceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DeviceAddress {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for DeviceAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Ok(DeviceAddress::from(raw.as_ref()))
    }
}
