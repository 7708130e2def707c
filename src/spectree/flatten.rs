//! Spec-tree evaluation: flattening and predicate evaluation against a
//! choice configuration.

use crate::spectree::SpecTree;
use crate::types::choices::{ChangedChoices, Choices};

/// What: Collect the active leaves of a tree for a choice configuration.
///
/// Inputs:
/// - `tree`: The tree to walk.
/// - `choices`: The owning package's choices.
/// - `changed`: Optional "what if" overlay.
///
/// Output:
/// - The leaves in declaration order, with conditional subtrees included
///   iff their condition is met. `Any` and `ExactlyOne` groups contribute
///   all of their active leaves; choosing among them is the caller's job.
pub fn flatten<'a, L>(
    tree: &'a SpecTree<L>,
    choices: &Choices,
    changed: Option<&ChangedChoices>,
) -> Vec<&'a L> {
    let mut out = Vec::new();
    collect(tree, choices, changed, &mut out);
    out
}

fn collect<'a, L>(
    tree: &'a SpecTree<L>,
    choices: &Choices,
    changed: Option<&ChangedChoices>,
    out: &mut Vec<&'a L>,
) {
    match tree {
        SpecTree::Leaf(leaf) => out.push(leaf),
        SpecTree::All(children) | SpecTree::Any(children) | SpecTree::ExactlyOne(children) => {
            for child in children {
                collect(child, choices, changed, out);
            }
        }
        SpecTree::Conditional { condition, children } => {
            if condition.is_met(choices, changed) {
                for child in children {
                    collect(child, choices, changed, out);
                }
            }
        }
    }
}

/// What: Evaluate a tree against a per-leaf predicate.
///
/// Inputs:
/// - `tree`: The tree to evaluate.
/// - `choices` / `changed`: Choice configuration for conditionals.
/// - `leaf_met`: Whether one leaf counts as met.
///
/// Output:
/// - `All` requires every child met, `Any` at least one, `ExactlyOne`
///   exactly one. A conditional whose condition fails is vacuously met.
///   Empty groups are met (`Any` with no children included).
pub fn evaluate<L>(
    tree: &SpecTree<L>,
    choices: &Choices,
    changed: Option<&ChangedChoices>,
    leaf_met: &impl Fn(&L) -> bool,
) -> bool {
    match tree {
        SpecTree::Leaf(leaf) => leaf_met(leaf),
        SpecTree::All(children) => children
            .iter()
            .all(|c| evaluate(c, choices, changed, leaf_met)),
        SpecTree::Any(children) => {
            children.is_empty()
                || children
                    .iter()
                    .any(|c| evaluate(c, choices, changed, leaf_met))
        }
        SpecTree::ExactlyOne(children) => {
            children.is_empty()
                || children
                    .iter()
                    .filter(|c| evaluate(c, choices, changed, leaf_met))
                    .count()
                    == 1
        }
        SpecTree::Conditional { condition, children } => {
            !condition.is_met(choices, changed)
                || children
                    .iter()
                    .all(|c| evaluate(c, choices, changed, leaf_met))
        }
    }
}
