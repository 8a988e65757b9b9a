//! Module revision dates.
//!
//! Revisions are `YYYY-MM-DD` calendar dates. On the wire they are packed
//! into 16 bits: bits 15..9 hold the year minus 2000, bits 8..5 the month
//! and bits 4..0 the day. `0` means no revision.

use std::fmt;
use std::str::FromStr;

use crate::codec::bits::{prepend_bits, right_bit_mask, shift_right};
use crate::limits::{REV_DAY_BITS, REV_MONTH_BITS, REV_YEAR_BITS, REV_YEAR_OFFSET};

/// Error type for revision parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionParseError {
    pub message: String,
}

impl fmt::Display for RevisionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RevisionParseError {}

/// A module revision date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    year: u16,
    month: u8,
    day: u8,
}

/// Returns true if the given year is a leap year.
fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Returns the number of days in a given month (1-indexed).
fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

impl Revision {
    /// Creates a revision, validating the calendar date.
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, RevisionParseError> {
        if !(1..=12).contains(&month) {
            return Err(RevisionParseError {
                message: format!("Invalid month: {}", month),
            });
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(RevisionParseError {
                message: format!("Invalid day {} for {:04}-{:02}", day, year, month),
            });
        }
        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// True if the year fits the 7-bit packed form (2000..=2127).
    pub fn is_packable(&self) -> bool {
        self.year >= REV_YEAR_OFFSET
            && self.year - REV_YEAR_OFFSET <= right_bit_mask(REV_YEAR_BITS) as u16
    }

    /// Returns the 16-bit wire form. Years outside the packable range map to 0.
    pub fn pack(&self) -> u16 {
        if !self.is_packable() {
            return 0;
        }
        let mut buf = [0u8; 2];
        prepend_bits(&mut buf, (self.year - REV_YEAR_OFFSET) as u8, REV_YEAR_BITS);
        prepend_bits(&mut buf, self.month, REV_MONTH_BITS);
        prepend_bits(&mut buf, self.day, REV_DAY_BITS);
        u16::from_le_bytes(buf)
    }
}

impl FromStr for Revision {
    type Err = RevisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RevisionParseError {
            message: format!("Invalid revision format: {} (expected YYYY-MM-DD)", s),
        };
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(invalid());
        }
        let digits = |range: std::ops::Range<usize>| -> Result<u16, RevisionParseError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        let year = digits(0..4)?;
        let month = digits(5..7)? as u8;
        let day = digits(8..10)? as u8;
        Revision::new(year, month, day)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Packs an optional revision. No revision packs to 0.
pub fn pack_revision(revision: Option<&Revision>) -> u16 {
    revision.map_or(0, Revision::pack)
}

/// Unpacks the 16-bit wire form. Returns `Ok(None)` for 0.
pub fn unpack_revision(packed: u16) -> Result<Option<Revision>, RevisionParseError> {
    if packed == 0 {
        return Ok(None);
    }
    let mut buf = packed.to_le_bytes();
    let day = buf[0] & right_bit_mask(REV_DAY_BITS);
    shift_right(&mut buf, REV_DAY_BITS);
    let month = buf[0] & right_bit_mask(REV_MONTH_BITS);
    shift_right(&mut buf, REV_MONTH_BITS);
    let year = (buf[0] & right_bit_mask(REV_YEAR_BITS)) as u16 + REV_YEAR_OFFSET;
    Revision::new(year, month, day).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let rev: Revision = "2016-02-29".parse().unwrap();
        assert_eq!((rev.year(), rev.month(), rev.day()), (2016, 2, 29));
        assert_eq!(rev.to_string(), "2016-02-29");
    }

    #[test]
    fn test_invalid_revisions() {
        for bad in [
            "2017-02-29",
            "2018-13-01",
            "2018-04-31",
            "2018-00-10",
            "2018-1-10",
            "20180110",
            "2018-01-1x",
            "+018-01-10",
        ] {
            assert!(bad.parse::<Revision>().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_pack_layout() {
        let rev: Revision = "2018-01-10".parse().unwrap();
        // year 18, month 1, day 10
        assert_eq!(rev.pack(), (18 << 9) | (1 << 5) | 10);
        assert_eq!(unpack_revision(rev.pack()).unwrap(), Some(rev));
        assert_eq!(pack_revision(None), 0);
        assert_eq!(unpack_revision(0).unwrap(), None);
    }

    #[test]
    fn test_unpack_rejects_invalid_date() {
        // month 13
        assert!(unpack_revision((5 << 9) | (13 << 5) | 1).is_err());
        // day 0
        assert!(unpack_revision((5 << 9) | (1 << 5)).is_err());
    }

    #[test]
    fn test_packable_range() {
        assert!(Revision::new(2000, 1, 1).unwrap().is_packable());
        assert!(Revision::new(2127, 12, 31).unwrap().is_packable());
        assert!(!Revision::new(2128, 1, 1).unwrap().is_packable());
        assert!(!Revision::new(1999, 12, 31).unwrap().is_packable());
        assert_eq!(Revision::new(2128, 1, 1).unwrap().pack(), 0);
    }

    #[test]
    fn test_pack_edges() {
        let last = Revision::new(2127, 12, 31).unwrap();
        assert_eq!(last.pack(), (127 << 9) | (12 << 5) | 31);
        assert_eq!(unpack_revision(last.pack()).unwrap(), Some(last));

        let first = Revision::new(2000, 1, 1).unwrap();
        assert_eq!(first.pack(), (1 << 5) | 1);
        assert_eq!(unpack_revision(first.pack()).unwrap(), Some(first));
    }

    #[test]
    fn test_ordering() {
        let older: Revision = "2017-12-31".parse().unwrap();
        let newer: Revision = "2018-01-01".parse().unwrap();
        assert!(older < newer);
    }
}
