use nexuslite_query::encoding::{Value, encode};
use nexuslite_query::query::{Bound, Bounds, CmpOp, Filter};
use proptest::prelude::*;
use serde_json::json;

fn num(n: i32) -> Vec<u8> {
    encode(&Value::Number(f64::from(n)))
}

fn bound() -> impl Strategy<Value = Bound> {
    (
        proptest::option::of(-20i32..20),
        0i32..10,
        proptest::option::of(any::<bool>()),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(start, width, open_end, si, ei)| {
            let start_v = start.unwrap_or(-20);
            let end_v = start_v + width;
            // a zero-width range is only non-empty when closed on both sides
            let (si, ei) = if width == 0 { (true, true) } else { (si, ei) };
            Bound {
                start: start.map(num).unwrap_or_default(),
                end: if open_end.is_some() { Vec::new() } else { num(end_v) },
                start_include: si,
                end_include: ei,
            }
        })
}

fn op() -> impl Strategy<Value = CmpOp> {
    prop_oneof![
        Just(CmpOp::Eq),
        Just(CmpOp::Ne),
        Just(CmpOp::Gt),
        Just(CmpOp::Gte),
        Just(CmpOp::Lt),
        Just(CmpOp::Lte),
    ]
}

proptest! {
    #[test]
    fn prop_append_keeps_bounds_sorted_and_disjoint(bs in proptest::collection::vec(bound(), 0..8)) {
        let mut merged = Bounds::new();
        for b in &bs {
            merged.append(b.clone());
        }
        for pair in merged.as_slice().windows(2) {
            prop_assert!(!pair[1].start.is_empty(), "only the first bound can be open below");
            prop_assert!(pair[0].start < pair[1].start);
            prop_assert!(!pair[0].end.is_empty(), "an unbounded end must be last");
            prop_assert!(pair[0].end <= pair[1].start);
        }
        for point in -25..35 {
            let enc = num(point);
            let any_input = bs.iter().any(|b| b.contains(&enc));
            let in_merged = merged.as_slice().iter().any(|b| b.contains(&enc));
            prop_assert_eq!(any_input, in_merged, "point {}", point);
        }
    }

    #[test]
    fn prop_filter_bounds_cover_every_match(
        clauses in proptest::collection::vec((op(), -10i32..10), 1..4),
        any_of in any::<bool>(),
        values in proptest::collection::vec(-12i32..12, 1..20),
    ) {
        let comps: Vec<Filter> = clauses
            .iter()
            .map(|(op, n)| Filter::key("a", Filter::comp(*op, &Value::Number(f64::from(*n)))))
            .collect();
        let filter = if any_of { Filter::Or(comps) } else { Filter::And(comps) };
        for multikey in [false, true] {
            let Some(bounds) = filter.index_bounds_for("a", multikey) else {
                continue;
            };
            for n in &values {
                let doc = Value::from(json!({"a": n}));
                if filter.ok(&doc) {
                    prop_assert!(bounds.contains(&num(*n)), "{} matches {} outside {}", n, filter, bounds);
                }
            }
        }
    }
}
