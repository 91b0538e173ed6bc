//! Finality-provider registration metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TypesError;

/// Human-readable identity of a finality provider, submitted at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Display name
    pub moniker: String,
    /// Identity signature (e.g. keybase fingerprint)
    pub identity: String,
    /// Website URL
    pub website: String,
    /// Security contact e-mail
    pub security_contact: String,
    /// Free-form details
    pub details: String,
}

impl Description {
    /// Create a description with only a moniker set.
    pub fn with_moniker(moniker: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            ..Default::default()
        }
    }
}

/// Commission rate in `[0, 1]`, held as basis points to avoid float
/// comparison hazards.
///
/// Parses from decimal strings such as `"0.05"` (5%, 500 bps) and prints
/// back in decimal form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// Maximum rate: 100% == 10_000 basis points.
    pub const MAX_BPS: u32 = 10_000;

    /// Construct from basis points; errors when above 100%.
    pub fn from_bps(bps: u32) -> Result<Self, TypesError> {
        if bps > Self::MAX_BPS {
            return Err(TypesError::InvalidCommission(format!(
                "{bps} bps exceeds 100%"
            )));
        }
        Ok(Self(bps))
    }

    /// The rate in basis points.
    pub fn bps(&self) -> u32 {
        self.0
    }

    /// A zero commission rate.
    pub fn zero() -> Self {
        Self(0)
    }
}

impl FromStr for CommissionRate {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |msg: &str| TypesError::InvalidCommission(format!("{msg}: {s:?}"));

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad("empty rate"));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(bad("not a decimal number"));
        }
        if frac_part.len() > 4 {
            return Err(bad("more than 4 decimal places"));
        }

        let int: u32 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad("integer part overflow"))?
        };
        let mut frac_bps: u32 = 0;
        if !frac_part.is_empty() {
            let frac: u32 = frac_part.parse().map_err(|_| bad("fraction overflow"))?;
            frac_bps = frac * 10u32.pow(4 - frac_part.len() as u32);
        }

        Self::from_bps(int * Self::MAX_BPS + frac_bps)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}", self.0 / Self::MAX_BPS, self.0 % Self::MAX_BPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_parsing() {
        assert_eq!("0.05".parse::<CommissionRate>().unwrap().bps(), 500);
        assert_eq!("0.1".parse::<CommissionRate>().unwrap().bps(), 1000);
        assert_eq!("0".parse::<CommissionRate>().unwrap().bps(), 0);
        assert_eq!("1".parse::<CommissionRate>().unwrap().bps(), 10_000);
        assert_eq!("0.1234".parse::<CommissionRate>().unwrap().bps(), 1234);

        assert!("1.5".parse::<CommissionRate>().is_err());
        assert!("-0.1".parse::<CommissionRate>().is_err());
        assert!("0.12345".parse::<CommissionRate>().is_err());
        assert!("abc".parse::<CommissionRate>().is_err());
        assert!(".".parse::<CommissionRate>().is_err());
    }

    #[test]
    fn commission_display_roundtrip() {
        let rate: CommissionRate = "0.05".parse().unwrap();
        assert_eq!(rate.to_string(), "0.0500");
        assert_eq!(rate.to_string().parse::<CommissionRate>().unwrap(), rate);
    }
}
