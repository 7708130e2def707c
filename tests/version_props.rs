//! Property tests for the version algebra: total ordering and
//! parse/print round-trips.

use proptest::prelude::*;

use cinder::types::{VersionOperator, VersionSpec};

fn arb_version_string() -> impl Strategy<Value = String> {
    let parts = proptest::collection::vec(0u64..1000, 1..4)
        .prop_map(|ps| ps.iter().map(ToString::to_string).collect::<Vec<_>>().join("."));
    let letter = proptest::option::of(proptest::char::range('a', 'z'));
    let suffix = proptest::option::of(
        (prop_oneof!["alpha", "beta", "pre", "rc", "p"], 0u64..50).prop_map(|(kind, n)| {
            if n == 0 {
                format!("_{kind}")
            } else {
                format!("_{kind}{n}")
            }
        }),
    );
    let revision = proptest::option::of((1u64..50).prop_map(|r| format!("-r{r}")));
    (parts, letter, suffix, revision).prop_map(|(parts, letter, suffix, revision)| {
        let mut out = parts;
        if let Some(l) = letter {
            out.push(l);
        }
        if let Some(s) = suffix {
            out.push_str(&s);
        }
        if let Some(r) = revision {
            out.push_str(&r);
        }
        out
    })
}

fn arb_version() -> impl Strategy<Value = VersionSpec> {
    arb_version_string().prop_map(|s| VersionSpec::new(&s).expect("generated versions parse"))
}

proptest! {
    /// Parsing the printed form gives back the same version.
    #[test]
    fn round_trip(version in arb_version()) {
        let reparsed = VersionSpec::new(&version.to_string()).unwrap();
        prop_assert_eq!(&version, &reparsed);
    }

    /// The ordering is antisymmetric and total.
    #[test]
    fn order_is_antisymmetric(a in arb_version(), b in arb_version()) {
        use std::cmp::Ordering;
        let ab = a.cmp(&b);
        let ba = b.cmp(&a);
        prop_assert_eq!(ab, ba.reverse());
        if ab == Ordering::Equal {
            prop_assert_eq!(&a, &b);
        }
    }

    /// The ordering is transitive.
    #[test]
    fn order_is_transitive(a in arb_version(), b in arb_version(), c in arb_version()) {
        let mut sorted = vec![a, b, c];
        sorted.sort();
        prop_assert!(sorted[0] <= sorted[1] && sorted[1] <= sorted[2] && sorted[0] <= sorted[2]);
    }

    /// Operator matching is consistent with the ordering.
    #[test]
    fn operators_match_ordering(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(VersionOperator::Less.matches(&a, &b), a < b);
        prop_assert_eq!(VersionOperator::LessEqual.matches(&a, &b), a <= b);
        prop_assert_eq!(VersionOperator::Equal.matches(&a, &b), a == b);
        prop_assert_eq!(VersionOperator::GreaterEqual.matches(&a, &b), a >= b);
        prop_assert_eq!(VersionOperator::Greater.matches(&a, &b), a > b);
    }

    /// `~` ignores exactly the revision.
    #[test]
    fn tilde_ignores_revision(a in arb_version()) {
        let mut revised = a.clone();
        revised.revision = a.revision + 1;
        prop_assert!(VersionOperator::Tilde.matches(&revised, &a));
        prop_assert!(!VersionOperator::Equal.matches(&revised, &a));
    }
}
