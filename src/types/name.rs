//! Validated name newtypes for the package data model.
//!
//! Every name class in the data model is a newtype over `String` with a
//! constrained grammar. Construction from arbitrary strings is fallible:
//! a violation produces [`CinderError::Name`] carrying the offending
//! input and the grammar role it failed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CinderError, Result};

/// What: Validate a name against a character-class grammar.
///
/// Inputs:
/// - `input`: Candidate string.
/// - `role`: Grammar role used in the error message.
/// - `first`: Predicate for the first character.
/// - `rest`: Predicate for every following character.
///
/// Output:
/// - Returns `Ok(())` when the string is non-empty, the first character
///   satisfies `first`, and all remaining characters satisfy `rest`.
/// - Returns `CinderError::Name` otherwise.
fn validate_name(
    input: &str,
    role: &'static str,
    first: impl Fn(char) -> bool,
    rest: impl Fn(char) -> bool,
) -> Result<()> {
    let mut chars = input.chars();
    let ok = match chars.next() {
        Some(c) if first(c) => chars.all(rest),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CinderError::Name {
            role,
            input: input.to_string(),
        })
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-')
}

macro_rules! name_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// View the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CinderError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }
    };
}

name_newtype! {
    /// The category part of a qualified package name (e.g. `dev-libs`).
    CategoryNamePart
}

impl CategoryNamePart {
    /// Construct from a string, validating the category grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_name(&s, "category", is_name_start, is_name_char)?;
        Ok(Self(s))
    }
}

name_newtype! {
    /// The package part of a qualified package name (e.g. `openssl`).
    PackageNamePart
}

impl PackageNamePart {
    /// What: Construct from a string, validating the package-name grammar.
    ///
    /// Inputs:
    /// - `s`: Candidate package name.
    ///
    /// Output:
    /// - Returns `Ok(PackageNamePart)` for valid names.
    /// - Returns `CinderError::Name` if the grammar is violated.
    ///
    /// Details:
    /// - Besides the common name character class, a package name must not
    ///   end in a hyphen followed only by digits: `foo-1` would be
    ///   indistinguishable from a versioned atom.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_name(&s, "package", is_name_start, is_name_char)?;
        if let Some(pos) = s.rfind('-') {
            let tail = &s[pos + 1..];
            if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
                return Err(CinderError::Name {
                    role: "package",
                    input: s,
                });
            }
        }
        Ok(Self(s))
    }
}

/// A fully qualified package name: category plus package.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedPackageName {
    /// The category part.
    pub category: CategoryNamePart,
    /// The package part.
    pub package: PackageNamePart,
}

impl QualifiedPackageName {
    /// Construct from already-validated parts.
    #[must_use]
    pub const fn from_parts(category: CategoryNamePart, package: PackageNamePart) -> Self {
        Self { category, package }
    }

    /// What: Construct from a `category/package` string.
    ///
    /// Inputs:
    /// - `s`: String of the form `category/package`.
    ///
    /// Output:
    /// - Returns `Ok(QualifiedPackageName)` when both halves validate.
    /// - Returns `CinderError::Name` when the separator is missing,
    ///   appears more than once, or either half fails its grammar.
    pub fn new(s: &str) -> Result<Self> {
        let mut split = s.splitn(2, '/');
        let (cat, pkg) = match (split.next(), split.next()) {
            (Some(c), Some(p)) if !p.contains('/') => (c, p),
            _ => {
                return Err(CinderError::Name {
                    role: "qualified package",
                    input: s.to_string(),
                });
            }
        };
        Ok(Self {
            category: CategoryNamePart::new(cat)?,
            package: PackageNamePart::new(pkg)?,
        })
    }
}

impl fmt::Display for QualifiedPackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

impl FromStr for QualifiedPackageName {
    type Err = CinderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

name_newtype! {
    /// A slot name. Two versions of a package in different slots may be
    /// installed in parallel. Slot names allow an embedded `/` separating
    /// slot from sub-slot.
    SlotName
}

impl SlotName {
    /// Construct from a string, validating the slot grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_name(&s, "slot", is_name_start, |c| is_name_char(c) || c == '/')?;
        Ok(Self(s))
    }
}

name_newtype! {
    /// A repository name (e.g. `gentoo`, `installed`).
    RepositoryName
}

impl RepositoryName {
    /// Construct from a string, validating the repository grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_name(&s, "repository", is_name_start, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
        })?;
        Ok(Self(s))
    }
}

name_newtype! {
    /// A keyword name (e.g. `amd64`, `~x86`). A leading `~` marks an
    /// unstable keyword, a leading `-` a disabled one; the wildcards `*`
    /// and `-*` are accepted as written in user configuration.
    KeywordName
}

impl KeywordName {
    /// Construct from a string, validating the keyword grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s == "*" || s == "-*" || s == "~*" {
            return Ok(Self(s));
        }
        let body = s.strip_prefix(['~', '-']).unwrap_or(&s);
        validate_name(body, "keyword", is_name_start, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
        })
        .map_err(|_| CinderError::Name {
            role: "keyword",
            input: s.clone(),
        })?;
        Ok(Self(s))
    }

    /// Whether this is an unstable (`~`-prefixed) keyword.
    #[must_use]
    pub fn is_unstable(&self) -> bool {
        self.0.starts_with('~')
    }
}

name_newtype! {
    /// The name of a package set (e.g. `world`, `system`). A trailing `*`
    /// marks the match-any-version form of a set name.
    SetName
}

impl SetName {
    /// Construct from a string, validating the set-name grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let body = s.strip_suffix('*').unwrap_or(&s);
        validate_name(body, "set", is_name_start, is_name_char).map_err(|_| CinderError::Name {
            role: "set",
            input: s.clone(),
        })?;
        Ok(Self(s))
    }
}

name_newtype! {
    /// The prefix of a choice group (e.g. `linguas`). Lower-case.
    ChoicePrefixName
}

impl ChoicePrefixName {
    /// Construct from a string, validating the choice-prefix grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        // The empty prefix denotes the unprefixed (plain USE) group.
        if !s.is_empty() {
            validate_name(
                &s,
                "choice prefix",
                |c| c.is_ascii_lowercase(),
                |c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_',
            )?;
        }
        Ok(Self(s))
    }
}

name_newtype! {
    /// A choice (flag) name without its prefix (e.g. `ssl`).
    UnprefixedChoiceName
}

impl UnprefixedChoiceName {
    /// Construct from a string, validating the choice-name grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        validate_name(&s, "choice", is_name_start, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '@' | '.')
        })?;
        Ok(Self(s))
    }
}

name_newtype! {
    /// A choice name including its prefix, joined with `:` (e.g.
    /// `linguas:en`), or bare for the unprefixed group (e.g. `ssl`).
    ChoiceNameWithPrefix
}

impl ChoiceNameWithPrefix {
    /// Construct from a string, validating the prefixed-choice grammar.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let (prefix, flag) = match s.split_once(':') {
            Some((p, f)) => (p, f),
            None => ("", s.as_str()),
        };
        ChoicePrefixName::new(prefix).and_then(|_| UnprefixedChoiceName::new(flag))
            .map_err(|_| CinderError::Name {
                role: "prefixed choice",
                input: s.clone(),
            })?;
        Ok(Self(s))
    }

    /// Join a prefix and an unprefixed name.
    #[must_use]
    pub fn from_parts(prefix: &ChoicePrefixName, flag: &UnprefixedChoiceName) -> Self {
        if prefix.as_str().is_empty() {
            Self(flag.as_str().to_string())
        } else {
            Self(format!("{prefix}:{flag}"))
        }
    }
}
