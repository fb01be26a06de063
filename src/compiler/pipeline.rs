//! Pipeline composition.
//!
//! Splits a plan tree into maximal pipelines at the pipeline breakers.
//! Each breaker closes the pipeline feeding it (its build side) and opens
//! a new one that scans its materialized state; non-breakers append to
//! the pipeline their child produces into.

use super::codegen::CodeGen;
use super::translator::{OperatorTranslator, TranslatorChain};
use super::translators::{
    AggBuildTranslator, AggScanTranslator, FilterTranslator, IndexScanTranslator,
    JoinBuildTranslator, JoinProbeTranslator, OutputTranslator, ProjectionTranslator,
    SeqScanTranslator, SortBuildTranslator, SortScanTranslator,
};
use crate::plan::PlanNode;

/// The ordered pipelines of one compilation; earlier pipelines feed the
/// breaker state later ones scan.
pub struct PipelineSet {
    pub chains: Vec<TranslatorChain>,
}

impl PipelineSet {
    pub fn num_pipelines(&self) -> usize {
        self.chains.len()
    }
}

/// Split `plan` into pipelines, instantiating one translator per node.
pub fn split_plan(plan: &PlanNode, cg: &mut CodeGen) -> PipelineSet {
    let mut finished: Vec<Vec<Box<dyn OperatorTranslator>>> = Vec::new();
    let current = build(plan, cg, &mut finished);
    finished.push(current);
    PipelineSet {
        chains: finished.into_iter().map(TranslatorChain::new).collect(),
    }
}

/// True when any node in the tree carries a parallel hint.
pub fn plan_is_parallel(plan: &PlanNode) -> bool {
    let here = match plan {
        PlanNode::SeqScan { parallel, .. }
        | PlanNode::HashJoin { parallel, .. }
        | PlanNode::Aggregate { parallel, .. }
        | PlanNode::Sort { parallel, .. } => *parallel,
        _ => false,
    };
    here || plan.children().iter().any(|c| plan_is_parallel(c))
}

/// True when the emitted module references the thread-state container:
/// any parallel hint, or a top-k sort (its finalizer is partitioned).
pub fn plan_needs_thread_states(plan: &PlanNode) -> bool {
    let here = match plan {
        PlanNode::Sort { limit, .. } => limit.is_some(),
        _ => false,
    };
    here || plan_is_parallel(plan)
        || plan.children().iter().any(|c| plan_needs_thread_states(c))
}

fn build(
    node: &PlanNode,
    cg: &mut CodeGen,
    finished: &mut Vec<Vec<Box<dyn OperatorTranslator>>>,
) -> Vec<Box<dyn OperatorTranslator>> {
    match node {
        PlanNode::SeqScan { table, predicate, output, .. } => {
            vec![Box::new(SeqScanTranslator::new(
                table.clone(),
                predicate.clone(),
                output.col_types(),
            ))]
        }

        PlanNode::IndexScan { index, key, predicate, output, .. } => {
            vec![Box::new(IndexScanTranslator::new(
                index.clone(),
                key.clone(),
                predicate.clone(),
                output.col_types(),
            ))]
        }

        PlanNode::Filter { child, predicate } => {
            let mut current = build(child, cg, finished);
            current.push(Box::new(FilterTranslator::new(predicate.clone())));
            current
        }

        PlanNode::Projection { child, exprs, .. } => {
            let mut current = build(child, cg, finished);
            current.push(Box::new(ProjectionTranslator::new(exprs.clone())));
            current
        }

        PlanNode::HashJoin { left, right, left_keys, right_keys, parallel, .. } => {
            let jht = cg.fresh("jht");
            let build_types = left.output_schema().col_types();

            let mut build_side = build(left, cg, finished);
            build_side.push(Box::new(JoinBuildTranslator::new(
                jht.clone(),
                build_types.clone(),
                left_keys.clone(),
                *parallel,
            )));
            finished.push(build_side);

            let probe_types = right.output_schema().col_types();
            let probe_key_types = right_keys.iter().map(|k| probe_types[*k]).collect();
            let mut probe_side = build(right, cg, finished);
            probe_side.push(Box::new(JoinProbeTranslator::new(
                jht,
                build_types,
                left_keys.clone(),
                right_keys.clone(),
                probe_key_types,
            )));
            probe_side
        }

        PlanNode::Aggregate { child, group_by, aggregates, .. } => {
            let child_types = child.output_schema().col_types();
            let group_types: Vec<_> = group_by.iter().map(|g| child_types[*g]).collect();
            let agg_kinds: Vec<_> = aggregates.iter().map(|a| a.kind).collect();

            let (aht, agg_vars) = if group_by.is_empty() {
                let vars = aggregates.iter().map(|_| cg.fresh("agg")).collect::<Vec<_>>();
                (None, vars)
            } else {
                (Some(cg.fresh("aht")), Vec::new())
            };

            let mut build_side = build(child, cg, finished);
            build_side.push(Box::new(AggBuildTranslator::new(
                aht.clone(),
                agg_vars.clone(),
                group_by.clone(),
                group_types.clone(),
                aggregates.clone(),
            )));
            finished.push(build_side);

            vec![Box::new(AggScanTranslator::new(aht, agg_vars, group_types, agg_kinds))]
        }

        PlanNode::Sort { child, sort_keys, limit, parallel } => {
            let row_types = child.output_schema().col_types();
            let sorter = cg.fresh("sorter");

            let mut build_side = build(child, cg, finished);
            build_side.push(Box::new(SortBuildTranslator::new(
                sorter.clone(),
                row_types.clone(),
                sort_keys.clone(),
                *limit,
                *parallel,
            )));
            finished.push(build_side);

            vec![Box::new(SortScanTranslator::new(sorter, row_types))]
        }

        PlanNode::Output { child } => {
            let col_types = child.output_schema().col_types();
            let mut current = build(child, cg, finished);
            current.push(Box::new(OutputTranslator::new(col_types)));
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::table_iter::CmpOp;
    use crate::plan::{OutputSchema, PlanExpr, SortDirection};
    use crate::value::SqlType;

    fn scan(table: &str) -> PlanNode {
        PlanNode::SeqScan {
            table: table.into(),
            predicate: None,
            output: OutputSchema::new(vec![
                ("colA".into(), SqlType::Integer),
                ("colB".into(), SqlType::Integer),
            ]),
            parallel: false,
        }
    }

    #[test]
    fn test_scan_filter_output_is_one_pipeline() {
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::Filter {
                child: Box::new(scan("t")),
                predicate: PlanExpr::cmp(CmpOp::Eq, PlanExpr::col(0), PlanExpr::int(1)),
            }),
        };
        let mut cg = CodeGen::new();
        let set = split_plan(&plan, &mut cg);
        assert_eq!(set.num_pipelines(), 1);
        assert_eq!(set.chains[0].len(), 3);
    }

    #[test]
    fn test_sort_breaks_the_pipeline() {
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::Sort {
                child: Box::new(scan("t")),
                sort_keys: vec![(0, SortDirection::Asc)],
                limit: None,
                parallel: false,
            }),
        };
        let mut cg = CodeGen::new();
        let set = split_plan(&plan, &mut cg);
        assert_eq!(set.num_pipelines(), 2);
        // scan + sort build, then sort scan + output
        assert_eq!(set.chains[0].len(), 2);
        assert_eq!(set.chains[1].len(), 2);
    }

    #[test]
    fn test_join_produces_build_and_probe_pipelines() {
        let plan = PlanNode::Output {
            child: Box::new(PlanNode::HashJoin {
                left: Box::new(scan("l")),
                right: Box::new(scan("r")),
                left_keys: vec![0],
                right_keys: vec![0],
                output: OutputSchema::new(vec![
                    ("l.colA".into(), SqlType::Integer),
                    ("l.colB".into(), SqlType::Integer),
                    ("r.colA".into(), SqlType::Integer),
                    ("r.colB".into(), SqlType::Integer),
                ]),
                parallel: false,
            }),
        };
        let mut cg = CodeGen::new();
        let set = split_plan(&plan, &mut cg);
        assert_eq!(set.num_pipelines(), 2);
        // build: scan + join build; probe: scan + probe + output
        assert_eq!(set.chains[0].len(), 2);
        assert_eq!(set.chains[1].len(), 3);
    }

    #[test]
    fn test_parallel_hint_detection() {
        let mut plan = scan("t");
        assert!(!plan_is_parallel(&plan));
        if let PlanNode::SeqScan { parallel, .. } = &mut plan {
            *parallel = true;
        }
        let wrapped = PlanNode::Output { child: Box::new(plan) };
        assert!(plan_is_parallel(&wrapped));
    }
}
