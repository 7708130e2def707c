//! Dependency sanitisation: turn a dependency tree into the flat form
//! the resolver consumes.
//!
//! A sanitised dependency is one leaf of the tree with the labels that
//! were in effect at that point attached. `Any` and `ExactlyOne` groups
//! become a single sanitised entry carrying the group's alternatives;
//! the resolver explores those one at a time.

use serde::{Deserialize, Serialize};

use crate::spectree::{DependenciesLabel, DependencyLeaf, DependencySpecTree, SpecTree};
use crate::types::choices::{ChangedChoices, Choices};
use crate::types::name::SetName;
use crate::types::spec::{BlockDepSpec, PackageDepSpec};

/// One alternative of an `Any` / `ExactlyOne` group: the package specs
/// active in that branch. May be empty (the "nothing" alternative).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyAlternative {
    /// The branch's active package specs.
    pub specs: Vec<PackageDepSpec>,
}

/// The payload of a sanitised dependency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitisedSpec {
    /// A plain package dependency.
    Package(PackageDepSpec),
    /// A block.
    Block(BlockDepSpec),
    /// A named-set reference.
    NamedSet(SetName),
    /// An or-group of alternatives to be explored one at a time.
    Any {
        /// Whether exactly one alternative must hold rather than at
        /// least one.
        exactly_one: bool,
        /// The alternatives in declaration order.
        alternatives: Vec<DependencyAlternative>,
    },
}

/// One flattened dependency with its active labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitisedDependency {
    /// The labels in effect at the leaf.
    pub active_labels: Vec<DependenciesLabel>,
    /// The dependency payload.
    pub spec: SanitisedSpec,
    /// The original spec rendered back to text, for display.
    pub original_spec_string: String,
}

impl SanitisedDependency {
    /// Whether any active label forms a strict ordering arrow.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.active_labels.iter().any(|l| l.is_strict())
    }

    /// Whether every active label marks an optional dependency.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        !self.active_labels.is_empty() && self.active_labels.iter().all(|l| l.is_optional())
    }

    /// Whether any active label defers satisfaction until after the
    /// depending package.
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.active_labels.iter().all(|l| matches!(l, DependenciesLabel::Post))
            && !self.active_labels.is_empty()
    }
}

/// What: Produce the resolver-facing flat dependency list of a tree.
///
/// Inputs:
/// - `tree`: A package's dependency tree.
/// - `choices` / `changed`: Choice configuration for conditionals.
/// - `initial_labels`: The label context in effect before any label leaf
///   is seen (build+run for a combined dependencies key).
///
/// Output:
/// - One `SanitisedDependency` per active package / block / set leaf, in
///   declaration order; each `Any` or `ExactlyOne` group contributes one
///   entry carrying its active alternatives.
///
/// Details:
/// - A label leaf replaces the active label set for its *following
///   siblings*; label changes inside a group do not leak out of it.
/// - Conditional subtrees that fail their condition contribute nothing.
/// - Inside `Any` groups only package leaves participate; an alternative
///   whose conditionals all fail collapses to the empty alternative.
#[must_use]
pub fn sanitise_dependencies(
    tree: &DependencySpecTree,
    choices: &Choices,
    changed: Option<&ChangedChoices>,
    initial_labels: &[DependenciesLabel],
) -> Vec<SanitisedDependency> {
    let mut out = Vec::new();
    let children = std::slice::from_ref(tree);
    walk(children, choices, changed, initial_labels.to_vec(), &mut out);
    out
}

fn walk(
    block: &[DependencySpecTree],
    choices: &Choices,
    changed: Option<&ChangedChoices>,
    mut labels: Vec<DependenciesLabel>,
    out: &mut Vec<SanitisedDependency>,
) {
    for node in block {
        match node {
            SpecTree::Leaf(DependencyLeaf::Label(new_labels)) => {
                labels = new_labels.clone();
            }
            SpecTree::Leaf(DependencyLeaf::Package(spec)) => out.push(SanitisedDependency {
                active_labels: labels.clone(),
                original_spec_string: spec.to_string(),
                spec: SanitisedSpec::Package(spec.clone()),
            }),
            SpecTree::Leaf(DependencyLeaf::Block(block_spec)) => out.push(SanitisedDependency {
                active_labels: labels.clone(),
                original_spec_string: block_spec.to_string(),
                spec: SanitisedSpec::Block(block_spec.clone()),
            }),
            SpecTree::Leaf(DependencyLeaf::NamedSet(set)) => out.push(SanitisedDependency {
                active_labels: labels.clone(),
                original_spec_string: format!("@{set}"),
                spec: SanitisedSpec::NamedSet(set.clone()),
            }),
            SpecTree::All(children) => {
                walk(children, choices, changed, labels.clone(), out);
            }
            SpecTree::Conditional { condition, children } => {
                if condition.is_met(choices, changed) {
                    walk(children, choices, changed, labels.clone(), out);
                }
            }
            SpecTree::Any(children) | SpecTree::ExactlyOne(children) => {
                let alternatives = children
                    .iter()
                    .map(|child| DependencyAlternative {
                        specs: branch_packages(child, choices, changed),
                    })
                    .collect();
                out.push(SanitisedDependency {
                    active_labels: labels.clone(),
                    original_spec_string: node.to_string(),
                    spec: SanitisedSpec::Any {
                        exactly_one: matches!(node, SpecTree::ExactlyOne(_)),
                        alternatives,
                    },
                });
            }
        }
    }
}

fn branch_packages(
    node: &DependencySpecTree,
    choices: &Choices,
    changed: Option<&ChangedChoices>,
) -> Vec<PackageDepSpec> {
    crate::spectree::flatten(node, choices, changed)
        .into_iter()
        .filter_map(|leaf| match leaf {
            DependencyLeaf::Package(spec) => Some(spec.clone()),
            _ => None,
        })
        .collect()
}
