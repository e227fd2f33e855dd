//! Fluorescence detector site identifiers.

use crate::{Error, Result};
use std::fmt;

/// One of the three Telescope Array fluorescence detector stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteId {
    /// Black Rock Mesa (south-east station).
    BlackRock,
    /// Long Ridge (south-west station).
    LongRidge,
    /// Middle Drum (northern station, refurbished HiRes optics).
    MiddleDrum,
}

impl SiteId {
    /// All sites in numeric-id order.
    pub const ALL: [SiteId; 3] = [SiteId::BlackRock, SiteId::LongRidge, SiteId::MiddleDrum];

    /// Numeric site id as stored in geometry files.
    #[inline]
    pub fn as_raw(self) -> i32 {
        match self {
            SiteId::BlackRock => 0,
            SiteId::LongRidge => 1,
            SiteId::MiddleDrum => 2,
        }
    }

    /// Converts a numeric site id.
    ///
    /// # Errors
    /// Returns [`Error::UnknownSite`] for ids other than 0, 1, 2.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(SiteId::BlackRock),
            1 => Ok(SiteId::LongRidge),
            2 => Ok(SiteId::MiddleDrum),
            other => Err(Error::UnknownSite(other)),
        }
    }

    /// Two-letter station code used in file names (`br`, `lr`, `md`).
    #[inline]
    pub fn code(self) -> &'static str {
        match self {
            SiteId::BlackRock => "br",
            SiteId::LongRidge => "lr",
            SiteId::MiddleDrum => "md",
        }
    }

    /// Parses a two-letter station code or full name, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "br" | "blackrock" | "black_rock" => Some(SiteId::BlackRock),
            "lr" | "longridge" | "long_ridge" => Some(SiteId::LongRidge),
            "md" | "middledrum" | "middle_drum" => Some(SiteId::MiddleDrum),
            _ => None,
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SiteId::BlackRock => "Black Rock",
            SiteId::LongRidge => "Long Ridge",
            SiteId::MiddleDrum => "Middle Drum",
        };
        f.write_str(name)
    }
}

impl TryFrom<i32> for SiteId {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ids_round_trip() {
        for site in SiteId::ALL {
            assert_eq!(SiteId::from_raw(site.as_raw()).unwrap(), site);
        }
    }

    #[test]
    fn test_unknown_raw_id() {
        assert_eq!(SiteId::from_raw(7), Err(Error::UnknownSite(7)));
        assert!(SiteId::try_from(-1).is_err());
    }

    #[test]
    fn test_codes() {
        assert_eq!(SiteId::from_code("BR"), Some(SiteId::BlackRock));
        assert_eq!(SiteId::from_code("long_ridge"), Some(SiteId::LongRidge));
        assert_eq!(SiteId::from_code("md"), Some(SiteId::MiddleDrum));
        assert_eq!(SiteId::from_code("tale"), None);
        assert_eq!(SiteId::MiddleDrum.code(), "md");
    }
}
