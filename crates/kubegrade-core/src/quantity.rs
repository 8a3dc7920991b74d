//! Resource quantity parsing (`500m`, `0.5`, `128Mi`, `1e3`, `2G`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::domain::workload::RawQuantity;

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: &[(char, f64)] = &[
    ('k', 1e3),
    ('M', 1e6),
    ('G', 1e9),
    ('T', 1e12),
    ('P', 1e15),
    ('E', 1e18),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a valid resource quantity")]
pub struct QuantityError(pub String);

/// A parsed quantity in base units (cores, bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    value: f64,
    raw: String,
}

impl Quantity {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Plain decimal or exponent notation, non-negative and finite.
fn parse_number(s: &str) -> Option<f64> {
    let first = s.chars().next()?;
    if !(first.is_ascii_digit() || first == '.') {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    let value: f64 = s.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || QuantityError(s.to_string());

        for (suffix, factor) in BINARY_SUFFIXES {
            if let Some(number) = raw.strip_suffix(suffix) {
                let n = parse_number(number).ok_or_else(invalid)?;
                return Ok(Self {
                    value: n * factor,
                    raw: raw.to_string(),
                });
            }
        }

        if let Some(number) = raw.strip_suffix('m') {
            let n = parse_number(number).ok_or_else(invalid)?;
            return Ok(Self {
                value: n / 1000.0,
                raw: raw.to_string(),
            });
        }

        if let Some(last) = raw.chars().last() {
            if let Some((_, factor)) = DECIMAL_SUFFIXES.iter().find(|(c, _)| *c == last) {
                let number = &raw[..raw.len() - last.len_utf8()];
                // "1E" is exa, but "1e3"/"2E3" are exponent notation and
                // never end in a suffix letter.
                if let Some(n) = parse_number(number) {
                    return Ok(Self {
                        value: n * factor,
                        raw: raw.to_string(),
                    });
                }
            }
        }

        let value = parse_number(raw).ok_or_else(invalid)?;
        Ok(Self {
            value,
            raw: raw.to_string(),
        })
    }
}

impl TryFrom<&RawQuantity> for Quantity {
    type Error = QuantityError;

    fn try_from(raw: &RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Int(n) if *n >= 0 => Ok(Self {
                value: *n as f64,
                raw: n.to_string(),
            }),
            RawQuantity::Float(x) if x.is_finite() && *x >= 0.0 => Ok(Self {
                value: *x,
                raw: x.to_string(),
            }),
            RawQuantity::Text(s) => s.parse(),
            other => Err(QuantityError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> f64 {
        s.parse::<Quantity>().unwrap().value()
    }

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(q("500m"), 0.5);
        assert_eq!(q("0.5"), 0.5);
        assert_eq!(q("2"), 2.0);
        assert_eq!(q("250m"), 0.25);
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(q("128Mi"), 134_217_728.0);
        assert_eq!(q("1Gi"), 1_073_741_824.0);
        assert_eq!(q("1G"), 1e9);
        assert_eq!(q("64k"), 64_000.0);
    }

    #[test]
    fn test_exponent_versus_exa_suffix() {
        assert_eq!(q("1e3"), 1000.0);
        assert_eq!(q("2E3"), 2000.0);
        assert_eq!(q("1E"), 1e18);
    }

    #[test]
    fn test_invalid_quantities() {
        for bad in ["", "Mi", "lots", "-1", "1.5.5", "12MB", "inf", "128 Mi"] {
            assert!(bad.parse::<Quantity>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_ordering_across_units() {
        let a: Quantity = "512Mi".parse().unwrap();
        let b: Quantity = "1Gi".parse().unwrap();
        assert!(a < b);
        let c: Quantity = "1000m".parse().unwrap();
        let d: Quantity = "1".parse().unwrap();
        assert!(c >= d && c <= d);
    }

    #[test]
    fn test_from_raw_number() {
        let n = Quantity::try_from(&RawQuantity::Int(2)).unwrap();
        assert_eq!(n.value(), 2.0);
        assert!(Quantity::try_from(&RawQuantity::Int(-1)).is_err());
        let f = Quantity::try_from(&RawQuantity::Float(0.25)).unwrap();
        assert_eq!(f.value(), 0.25);
    }
}
