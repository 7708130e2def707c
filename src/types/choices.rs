//! Choice (flag) state for packages.
//!
//! A package's configurable switches form a set of [`Choice`] groups,
//! each with a prefix and an ordered set of [`ChoiceValue`]s. A
//! [`ChangedChoices`] overlay represents "what if these flags were
//! flipped" without mutating the underlying state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::name::{ChoiceNameWithPrefix, ChoicePrefixName, UnprefixedChoiceName};

/// Where a choice value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceOrigin {
    /// Declared by the package's metadata.
    Explicit,
    /// Synthesised (e.g. an expanded prefix value seen only in use).
    Implicit,
}

/// A profile-imposed constraint on a choice value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceForce {
    /// Not constrained by the profile.
    #[default]
    None,
    /// Forced on; the effective state is enabled.
    Enabled,
    /// Masked off; the effective state is disabled.
    Disabled,
}

/// One value (flag) within a choice group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceValue {
    /// The flag name without its prefix.
    pub unprefixed_name: UnprefixedChoiceName,
    /// The flag name including the group prefix.
    pub name_with_prefix: ChoiceNameWithPrefix,
    /// Whether the flag is currently enabled.
    pub enabled: bool,
    /// Whether the user may change the flag.
    pub locked: bool,
    /// Profile force/mask state. A forced value is also locked.
    pub force: ChoiceForce,
    /// Optional parameter (for parameterised choices such as build
    /// options carrying a value).
    pub parameter: Option<String>,
    /// Whether the value was declared or synthesised.
    pub origin: ChoiceOrigin,
}

impl ChoiceValue {
    /// The effective enabled state, honouring profile force/mask.
    #[must_use]
    pub const fn effective_enabled(&self) -> bool {
        match self.force {
            ChoiceForce::Enabled => true,
            ChoiceForce::Disabled => false,
            ChoiceForce::None => self.enabled,
        }
    }

    /// Whether the user can flip this value.
    #[must_use]
    pub const fn changeable(&self) -> bool {
        !self.locked && matches!(self.force, ChoiceForce::None)
    }
}

/// A group of choice values sharing a prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Human-readable group name (e.g. `USE`, `Linguas`).
    pub human_name: String,
    /// The group prefix; empty for the plain group.
    pub prefix: ChoicePrefixName,
    /// The values, in declaration order.
    pub values: Vec<ChoiceValue>,
}

/// All choice groups of one package.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choices {
    groups: Vec<Choice>,
}

impl Choices {
    /// Construct from groups.
    #[must_use]
    pub fn new(groups: Vec<Choice>) -> Self {
        Self { groups }
    }

    /// The groups, in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[Choice] {
        &self.groups
    }

    /// What: Find a value by its prefixed name.
    ///
    /// Inputs:
    /// - `name`: Prefixed flag name (e.g. `linguas:en` or `ssl`).
    ///
    /// Output:
    /// - Returns `Some(&ChoiceValue)` when any group declares the flag.
    /// - Returns `None` otherwise.
    #[must_use]
    pub fn find(&self, name: &ChoiceNameWithPrefix) -> Option<&ChoiceValue> {
        self.groups
            .iter()
            .flat_map(|g| g.values.iter())
            .find(|v| v.name_with_prefix == *name)
    }

    /// The effective enabled state of a flag, `None` if undeclared.
    #[must_use]
    pub fn enabled(&self, name: &ChoiceNameWithPrefix) -> Option<bool> {
        self.find(name).map(ChoiceValue::effective_enabled)
    }

    /// What: Set a flag's enabled state in place.
    ///
    /// Output:
    /// - Returns `false` when the flag is undeclared, locked or
    ///   profile-forced; `true` when the state was applied.
    pub fn set_enabled(&mut self, name: &ChoiceNameWithPrefix, enabled: bool) -> bool {
        for group in &mut self.groups {
            for value in &mut group.values {
                if value.name_with_prefix == *name {
                    if !value.changeable() {
                        return false;
                    }
                    value.enabled = enabled;
                    return true;
                }
            }
        }
        false
    }
}

/// An overlay of hypothetical flag flips over a package's [`Choices`].
///
/// Used to evaluate conditional dependency subtrees under "what if"
/// configurations without rebuilding the package's choice state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedChoices {
    overrides: BTreeMap<ChoiceNameWithPrefix, bool>,
}

impl ChangedChoices {
    /// An empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What: Record a hypothetical state for a flag.
    ///
    /// Inputs:
    /// - `name`: Prefixed flag name.
    /// - `enabled`: The hypothetical state.
    ///
    /// Output:
    /// - Returns `false` (and records nothing) when the flag is locked or
    ///   profile-forced in `base`; returns `true` otherwise.
    pub fn insert(&mut self, base: &Choices, name: ChoiceNameWithPrefix, enabled: bool) -> bool {
        if let Some(value) = base.find(&name) {
            if !value.changeable() {
                return false;
            }
        }
        self.overrides.insert(name, enabled);
        true
    }

    /// Whether the overlay changes anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// The overlay's view of a flag, `None` when not overridden.
    #[must_use]
    pub fn overridden(&self, name: &ChoiceNameWithPrefix) -> Option<bool> {
        self.overrides.get(name).copied()
    }

    /// What: Resolve a flag's effective state under this overlay.
    ///
    /// Inputs:
    /// - `base`: The package's declared choices.
    /// - `name`: Prefixed flag name.
    ///
    /// Output:
    /// - The overridden state if present, else the base effective state,
    ///   else `None` for undeclared flags.
    #[must_use]
    pub fn effective(&self, base: &Choices, name: &ChoiceNameWithPrefix) -> Option<bool> {
        self.overridden(name).or_else(|| base.enabled(name))
    }
}

/// Build a plain (unprefixed) choice value, for repositories and tests.
pub fn plain_choice_value(name: &str, enabled: bool) -> crate::error::Result<ChoiceValue> {
    let unprefixed = UnprefixedChoiceName::new(name)?;
    Ok(ChoiceValue {
        name_with_prefix: ChoiceNameWithPrefix::from_parts(&ChoicePrefixName::new("")?, &unprefixed),
        unprefixed_name: unprefixed,
        enabled,
        locked: false,
        force: ChoiceForce::None,
        parameter: None,
        origin: ChoiceOrigin::Explicit,
    })
}
