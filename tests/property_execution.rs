//! Property-based tests over the runtime pieces
//!
//! Sorter ordering, row-layout roundtrips and checker arithmetic hold for
//! arbitrary inputs, not just the fixtures the scenario tests use.

use basalt::checker::{Checker, SingleIntSortChecker, SingleIntSumChecker};
use basalt::exec::row::RowLayout;
use basalt::exec::sorter::Sorter;
use basalt::exec::MemoryPool;
use basalt::value::{SqlType, SqlValue};
use proptest::prelude::*;
use std::sync::Arc;

fn encode_sorter(values: &[i64]) -> Sorter {
    let layout = RowLayout::new(vec![SqlType::BigInt]);
    let pool = Arc::new(MemoryPool::new());
    let cmp_layout = layout.clone();
    let cmp_pool = Arc::clone(&pool);
    let mut sorter = Sorter::new(
        Arc::new(move |a: &[u8], b: &[u8]| {
            let av = cmp_layout.read(a, 0, &cmp_pool);
            let bv = cmp_layout.read(b, 0, &cmp_pool);
            av.total_cmp(&bv)
        }),
        layout.size(),
    );
    for v in values {
        let id = sorter.alloc_input();
        layout.encode_row(&[SqlValue::integer(*v)], sorter.row_mut(id), &pool);
    }
    sorter
}

fn decode_sorted(sorter: &Sorter) -> Vec<i64> {
    let layout = RowLayout::new(vec![SqlType::BigInt]);
    let pool = MemoryPool::new();
    let mut out = Vec::new();
    let mut it = sorter.cursor();
    while it.has_next(sorter) {
        out.push(
            layout
                .read(it.get_row(sorter), 0, &pool)
                .as_integer()
                .expect("encoded integer"),
        );
        it.next();
    }
    out
}

proptest! {
    #[test]
    fn prop_sorter_produces_totally_ordered_run(values in prop::collection::vec(any::<i64>(), 0..300)) {
        let mut sorter = encode_sorter(&values);
        sorter.sort();
        let out = decode_sorted(&sorter);

        prop_assert_eq!(out.len(), values.len());
        prop_assert!(out.windows(2).all(|w| w[0] <= w[1]));

        let mut expected = values.clone();
        expected.sort_unstable();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_parallel_sort_matches_serial(values in prop::collection::vec(any::<i64>(), 0..300)) {
        let mut serial = encode_sorter(&values);
        serial.sort();

        let mut parallel = encode_sorter(&[]);
        let locals: Vec<Sorter> = values.chunks(64).map(encode_sorter).collect();
        parallel.sort_parallel(locals);

        prop_assert_eq!(decode_sorted(&serial), decode_sorted(&parallel));
    }

    #[test]
    fn prop_row_layout_roundtrips_nullable_ints(cells in prop::collection::vec(any::<Option<i64>>(), 1..16)) {
        let layout = RowLayout::new(vec![SqlType::BigInt; cells.len()]);
        let pool = MemoryPool::new();
        let row: Vec<SqlValue> = cells
            .iter()
            .map(|c| match c {
                Some(v) => SqlValue::integer(*v),
                None => SqlValue::null_of(SqlType::BigInt),
            })
            .collect();
        let mut buf = vec![0u8; layout.size()];
        layout.encode_row(&row, &mut buf, &pool);
        prop_assert_eq!(layout.decode_row(&buf, &pool), row);
    }

    #[test]
    fn prop_sum_checker_matches_iterator_sum(values in prop::collection::vec(any::<Option<i32>>(), 0..200)) {
        let rows: Vec<Vec<SqlValue>> = values
            .iter()
            .map(|c| match c {
                Some(v) => vec![SqlValue::integer(i64::from(*v))],
                None => vec![SqlValue::null_of(SqlType::Integer)],
            })
            .collect();
        let expected: i64 = values.iter().flatten().map(|v| i64::from(*v)).sum();

        let mut checker = SingleIntSumChecker::new(0, expected);
        checker.process_batch(&rows).expect("batch");
        prop_assert!(checker.check_correctness().is_ok());

        let mut wrong = SingleIntSumChecker::new(0, expected + 1);
        wrong.process_batch(&rows).expect("batch");
        prop_assert!(wrong.check_correctness().is_err());
    }

    #[test]
    fn prop_sort_checker_accepts_sorted_rejects_regressions(mut values in prop::collection::vec(any::<i64>(), 2..100)) {
        values.sort_unstable();
        let rows: Vec<Vec<SqlValue>> = values.iter().map(|v| vec![SqlValue::integer(*v)]).collect();
        let mut checker = SingleIntSortChecker::new(0);
        checker.process_batch(&rows).expect("sorted input");
        prop_assert!(checker.check_correctness().is_ok());

        // a strictly smaller value after the maximum must be rejected
        let max = *values.last().expect("non-empty");
        if max > i64::MIN {
            let regression = vec![vec![SqlValue::integer(max - 1)]];
            prop_assert!(checker.process_batch(&regression).is_err());
        }
    }
}
