//! Structured version numbers and version operators.
//!
//! A [`VersionSpec`] is a parsed version string: dot-separated numeric
//! parts, an optional trailing letter, a sequence of suffixes
//! (`_alpha`, `_beta`, `_pre`, `_rc`, `_p`, each with an optional number),
//! and an optional revision (`-rN`). Comparison is lexicographic over the
//! structured parts, never a string compare, and forms a strict total
//! order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CinderError, Result};

/// The kind of a version suffix. `Ordering`: `alpha < beta < pre < rc <
/// (no suffix) < p`; the no-suffix rank sits between `Rc` and `P`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SuffixKind {
    /// `_alpha`
    Alpha,
    /// `_beta`
    Beta,
    /// `_pre`
    Pre,
    /// `_rc`
    Rc,
    /// `_p` (patch level). Sorts above a plain version.
    P,
}

impl SuffixKind {
    /// Comparison rank, leaving a gap at 4 for "no suffix".
    const fn rank(self) -> u8 {
        match self {
            Self::Alpha => 0,
            Self::Beta => 1,
            Self::Pre => 2,
            Self::Rc => 3,
            Self::P => 5,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Pre => "pre",
            Self::Rc => "rc",
            Self::P => "p",
        }
    }
}

/// One suffix of a version: its kind plus a number (`_rc3` has number 3;
/// a bare `_rc` has number 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionSuffix {
    /// The suffix kind.
    pub kind: SuffixKind,
    /// The suffix number; 0 when omitted.
    pub number: u64,
}

/// A structured version number.
///
/// Equality and hashing agree with the ordering: `1.2` and `1.2.0`
/// compare (and hash) equal, since missing numeric components read as
/// zero.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Dot-separated numeric components, as integers.
    pub parts: Vec<u64>,
    /// Optional single trailing letter on the last numeric component.
    pub letter: Option<char>,
    /// Suffix sequence, in written order.
    pub suffixes: Vec<VersionSuffix>,
    /// Revision (`-rN`); 0 means no revision.
    pub revision: u64,
}

impl VersionSpec {
    /// What: Parse a version string into its structured form.
    ///
    /// Inputs:
    /// - `input`: Version text, e.g. `1.2.3b_alpha4_p1-r2`.
    ///
    /// Output:
    /// - Returns `Ok(VersionSpec)` when the grammar is met.
    /// - Returns `CinderError::Version` describing the first violation.
    ///
    /// Details:
    /// - Numeric components are parsed as integers; `1.02` and `1.2`
    ///   parse to the same components and compare equal.
    /// - A single ASCII letter may follow the last numeric component.
    /// - Suffixes are `_alpha`, `_beta`, `_pre`, `_rc`, `_p`, each with an
    ///   optional non-negative number.
    /// - The revision is a trailing `-rN`.
    pub fn new(input: &str) -> Result<Self> {
        let fail = |reason: &str| CinderError::Version {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(fail("empty string"));
        }

        // Split off the revision first.
        let (body, revision) = match input.rsplit_once("-r") {
            Some((body, rev)) if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) => {
                let rev = rev.parse::<u64>().map_err(|_| fail("revision overflows"))?;
                (body, rev)
            }
            _ => (input, 0),
        };

        let mut chunks = body.split('_');
        let head = chunks.next().ok_or_else(|| fail("missing version body"))?;

        // The head is numeric parts with an optional trailing letter.
        let (digits, letter) = match head.chars().next_back() {
            Some(c) if c.is_ascii_alphabetic() => (&head[..head.len() - 1], Some(c)),
            _ => (head, None),
        };
        if digits.is_empty() {
            return Err(fail("no numeric components"));
        }
        let mut parts = Vec::new();
        for piece in digits.split('.') {
            if piece.is_empty() || !piece.chars().all(|c| c.is_ascii_digit()) {
                return Err(fail("numeric component is not a number"));
            }
            parts.push(piece.parse::<u64>().map_err(|_| fail("numeric component overflows"))?);
        }

        let mut suffixes = Vec::new();
        for chunk in chunks {
            let (kind, rest) = if let Some(rest) = chunk.strip_prefix("alpha") {
                (SuffixKind::Alpha, rest)
            } else if let Some(rest) = chunk.strip_prefix("beta") {
                (SuffixKind::Beta, rest)
            } else if let Some(rest) = chunk.strip_prefix("pre") {
                (SuffixKind::Pre, rest)
            } else if let Some(rest) = chunk.strip_prefix("rc") {
                (SuffixKind::Rc, rest)
            } else if let Some(rest) = chunk.strip_prefix("p") {
                (SuffixKind::P, rest)
            } else {
                return Err(fail("unknown suffix"));
            };
            let number = if rest.is_empty() {
                0
            } else if rest.chars().all(|c| c.is_ascii_digit()) {
                rest.parse::<u64>().map_err(|_| fail("suffix number overflows"))?
            } else {
                return Err(fail("suffix number is not a number"));
            };
            suffixes.push(VersionSuffix { kind, number });
        }

        Ok(Self {
            parts,
            letter,
            suffixes,
            revision,
        })
    }

    /// The version with its revision stripped.
    #[must_use]
    pub fn without_revision(&self) -> Self {
        Self {
            revision: 0,
            ..self.clone()
        }
    }

    /// What: Compare ignoring revisions (the `~` operator's equality).
    #[must_use]
    pub fn equal_ignoring_revision(&self, other: &Self) -> bool {
        self.without_revision() == other.without_revision()
    }

    /// What: Prefix-compare numeric components (the `=*` operator).
    ///
    /// Inputs:
    /// - `constraint`: The `=*` constraint version.
    ///
    /// Output:
    /// - Returns `true` when this version's numeric components start with
    ///   the constraint's components and any constraint letter matches.
    #[must_use]
    pub fn starts_with(&self, constraint: &Self) -> bool {
        if self.parts.len() < constraint.parts.len() {
            return false;
        }
        if self.parts[..constraint.parts.len()] != constraint.parts[..] {
            return false;
        }
        match constraint.letter {
            Some(l) => self.letter == Some(l),
            None => true,
        }
    }

    fn suffix_at(&self, idx: usize) -> (u8, u64) {
        self.suffixes
            .get(idx)
            .map_or((4, 0), |s| (s.kind.rank(), s.number))
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionSpec {}

impl std::hash::Hash for VersionSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Trailing zero components are invisible to the ordering, so
        // they must be invisible to the hash too.
        let significant = self
            .parts
            .iter()
            .rposition(|&p| p != 0)
            .map_or(0, |idx| idx + 1);
        self.parts[..significant].hash(state);
        self.letter.hash(state);
        self.suffixes.hash(state);
        self.revision.hash(state);
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        // Numeric parts, missing components are zero.
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            let a = self.parts.get(idx).copied().unwrap_or(0);
            let b = other.parts.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // Letter: none < 'a' < 'b' < ...
        match (self.letter, other.letter) {
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) if a != b => return a.cmp(&b),
            _ => {}
        }

        // Suffix sequences; an exhausted side reads as "no suffix".
        let suffix_len = self.suffixes.len().max(other.suffixes.len());
        for idx in 0..suffix_len {
            match self.suffix_at(idx).cmp(&other.suffix_at(idx)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        self.revision.cmp(&other.revision)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&parts)?;
        if let Some(l) = self.letter {
            write!(f, "{l}")?;
        }
        for s in &self.suffixes {
            write!(f, "_{}", s.kind.as_str())?;
            if s.number != 0 {
                write!(f, "{}", s.number)?;
            }
        }
        if self.revision != 0 {
            write!(f, "-r{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for VersionSpec {
    type Err = CinderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A version comparison operator as written in a package dep spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionOperator {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `=`
    Equal,
    /// `=*`: equal up to the constraint's component count.
    EqualStar,
    /// `~`: same version, any revision.
    Tilde,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,
}

impl VersionOperator {
    /// What: Test whether a candidate version satisfies `self constraint`.
    ///
    /// Inputs:
    /// - `have`: The candidate version.
    /// - `wanted`: The constraint version.
    ///
    /// Output:
    /// - Returns `true` when `have` satisfies the operator against
    ///   `wanted`.
    ///
    /// Details:
    /// - `=*` truncates `have` to `wanted`'s numeric component count for
    ///   the equality test.
    /// - `~` compares with revisions stripped from both sides.
    #[must_use]
    pub fn matches(self, have: &VersionSpec, wanted: &VersionSpec) -> bool {
        match self {
            Self::Less => have < wanted,
            Self::LessEqual => have <= wanted,
            Self::Equal => have == wanted,
            Self::EqualStar => have.starts_with(wanted),
            Self::Tilde => have.equal_ignoring_revision(wanted),
            Self::GreaterEqual => have >= wanted,
            Self::Greater => have > wanted,
        }
    }

    /// The operator's text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "=",
            Self::EqualStar => "=*",
            Self::Tilde => "~",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
        }
    }
}

impl fmt::Display for VersionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
