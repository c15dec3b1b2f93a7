//! Life-like two-state neighbour-count rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgument;

/// Birth/survival rule over the 8-cell Moore neighbourhood.
///
/// Bit `n` of `birth` set means a dead cell with `n` alive neighbours comes
/// alive; bit `n` of `survive` set means an alive cell with `n` alive
/// neighbours stays alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rule {
    birth: u16,
    survive: u16,
}

impl Rule {
    /// B3/S23.
    pub const fn conway() -> Self {
        Self {
            birth: 1 << 3,
            survive: (1 << 2) | (1 << 3),
        }
    }

    pub fn new(birth: &[u8], survive: &[u8]) -> Result<Self, InvalidArgument> {
        let mut rule = Self {
            birth: 0,
            survive: 0,
        };
        for &n in birth {
            rule.birth |= Self::bit(n)?;
        }
        for &n in survive {
            rule.survive |= Self::bit(n)?;
        }
        rule.validate()?;
        Ok(rule)
    }

    fn bit(n: u8) -> Result<u16, InvalidArgument> {
        if n > 8 {
            return Err(InvalidArgument::Rule {
                raw: n.to_string(),
                reason: "neighbour counts range over 0..=8".to_string(),
            });
        }
        Ok(1 << n)
    }

    fn validate(&self) -> Result<(), InvalidArgument> {
        if self.birth & 1 != 0 {
            return Err(InvalidArgument::Rule {
                raw: self.to_string(),
                reason: "birth on 0 neighbours would fill the infinite background".to_string(),
            });
        }
        Ok(())
    }

    /// Next state of one cell given its current state and alive-neighbour count.
    #[inline]
    pub fn next(&self, alive: bool, neighbours: u32) -> bool {
        let mask = if alive { self.survive } else { self.birth };
        neighbours <= 8 && mask & (1 << neighbours) != 0
    }

    pub fn is_conway(&self) -> bool {
        *self == Self::conway()
    }
}

impl Default for Rule {
    fn default() -> Self {
        Self::conway()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("B")?;
        for n in 0..=8 {
            if self.birth & (1 << n) != 0 {
                write!(f, "{n}")?;
            }
        }
        f.write_str("/S")?;
        for n in 0..=8 {
            if self.survive & (1 << n) != 0 {
                write!(f, "{n}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({self})")
    }
}

impl FromStr for Rule {
    type Err = InvalidArgument;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| InvalidArgument::Rule {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = raw.trim();
        let Some((birth, survive)) = trimmed.split_once('/') else {
            return Err(invalid("expected `B<digits>/S<digits>`"));
        };
        let birth = birth
            .strip_prefix(['B', 'b'])
            .ok_or_else(|| invalid("birth part must start with `B`"))?;
        let survive = survive
            .strip_prefix(['S', 's'])
            .ok_or_else(|| invalid("survival part must start with `S`"))?;

        let digits = |part: &str| -> Result<Vec<u8>, InvalidArgument> {
            part.chars()
                .map(|ch| match ch.to_digit(10) {
                    Some(d) if d <= 8 => Ok(d as u8),
                    _ => Err(invalid("neighbour counts must be digits 0-8")),
                })
                .collect()
        };
        let rule = Rule::new(&digits(birth)?, &digits(survive)?).map_err(|err| match err {
            InvalidArgument::Rule { reason, .. } => InvalidArgument::Rule {
                raw: raw.to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(rule)
    }
}

impl TryFrom<String> for Rule {
    type Error = InvalidArgument;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.to_string()
    }
}
