// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use arrow::array::{Array, Float64Array, Int64Array, StringArray};

use rill::exec::agg::{AggregateOptions, ScalarAggregateOptions, VarianceOptions};
use rill::exec::node::aggregate::Aggregate;
use rill::exec::test_util::{
    flatten_i32, make_basic_batches, make_groupable_batches, make_random_batches,
    start_and_collect,
};
use rill::ExecPlan;

fn float_at(batch: &rill::ExecBatch, i: usize) -> Option<f64> {
    let array = batch.column(i).inner();
    let array = array.as_any().downcast_ref::<Float64Array>().unwrap();
    array.is_valid(0).then(|| array.value(0))
}

fn int_at(batch: &rill::ExecBatch, i: usize) -> Option<i64> {
    let array = batch.column(i).inner();
    let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
    array.is_valid(0).then(|| array.value(0))
}

#[test]
fn parallel_variance_matches_direct_computation() {
    let fixture = make_random_batches(20, 32);
    let values: Vec<f64> = flatten_i32(&fixture.batches, 0)
        .into_iter()
        .flatten()
        .map(|v| v as f64)
        .collect();
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let expected = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;

    let plan = ExecPlan::new();
    let source = plan
        .add_source(
            "source",
            make_random_batches(20, 32).source_options(false, 4),
        )
        .unwrap();
    let agg = plan
        .add_scalar_aggregate(
            "aggregate",
            source,
            vec![Aggregate::new("variance", "i32", "variance")],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    let batches = start_and_collect(&plan, &handle).unwrap();
    let variance = float_at(&batches[0], 0).unwrap();
    assert!(
        (variance - expected).abs() < 1e-6 * expected.max(1.0),
        "variance {} vs expected {}",
        variance,
        expected
    );
}

#[test]
fn variance_options_select_sample_variance() {
    // i32 values in the basic fixture: 4, 5, 6, 7 (one null skipped).
    // Population variance 1.25, sample variance 5/3.
    let plan = ExecPlan::new();
    let source = plan
        .add_source("source", make_basic_batches().source_options(false, 1))
        .unwrap();
    let agg = plan
        .add_scalar_aggregate(
            "aggregate",
            source,
            vec![
                Aggregate::new("variance", "i32", "var_pop"),
                Aggregate::new("variance", "i32", "var_samp")
                    .with_options(AggregateOptions::Variance(VarianceOptions { ddof: 1 })),
                Aggregate::new("stddev", "i32", "std_pop"),
            ],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    let batches = start_and_collect(&plan, &handle).unwrap();
    let batch = &batches[0];
    assert!((float_at(batch, 0).unwrap() - 1.25).abs() < 1e-12);
    assert!((float_at(batch, 1).unwrap() - 5.0 / 3.0).abs() < 1e-12);
    assert!((float_at(batch, 2).unwrap() - 1.25f64.sqrt()).abs() < 1e-12);
}

#[test]
fn min_count_and_skip_nulls_plumb_through() {
    let plan = ExecPlan::new();
    let source = plan
        .add_source("source", make_basic_batches().source_options(false, 1))
        .unwrap();
    let agg = plan
        .add_scalar_aggregate(
            "aggregate",
            source,
            vec![
                Aggregate::new("sum", "i32", "sum_gated").with_options(AggregateOptions::Scalar(
                    ScalarAggregateOptions {
                        skip_nulls: true,
                        min_count: 10,
                    },
                )),
                Aggregate::new("sum", "i32", "sum_strict").with_options(
                    AggregateOptions::Scalar(ScalarAggregateOptions {
                        skip_nulls: false,
                        min_count: 1,
                    }),
                ),
                Aggregate::new("sum", "i32", "sum_default"),
            ],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    let batches = start_and_collect(&plan, &handle).unwrap();
    let batch = &batches[0];
    // Fewer than ten values: gated to null.
    assert_eq!(int_at(batch, 0), None);
    // The fixture has a null i32, so the strict sum poisons.
    assert_eq!(int_at(batch, 1), None);
    assert_eq!(int_at(batch, 2), Some(22));
}

#[test]
fn grouped_aggregates_share_one_grouper() {
    let plan = ExecPlan::new();
    let source = plan
        .add_source("source", make_groupable_batches(1).source_options(false, 1))
        .unwrap();
    let agg = plan
        .add_grouped_aggregate(
            "aggregate",
            source,
            vec!["str".to_string()],
            vec![
                Aggregate::new("hash_sum", "i32", "sum"),
                Aggregate::new("hash_count", "i32", "count"),
                Aggregate::new("hash_mean", "i32", "mean"),
            ],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    assert_eq!(handle.schema().field(0).name(), "sum");
    assert_eq!(handle.schema().field(3).name(), "str");

    let batches = start_and_collect(&plan, &handle).unwrap();
    let batch = &batches[0];
    assert_eq!(batch.length, 3);

    let sums = batch.column(0).inner();
    let sums = sums.as_any().downcast_ref::<Int64Array>().unwrap();
    let counts = batch.column(1).inner();
    let counts = counts.as_any().downcast_ref::<Int64Array>().unwrap();
    let means = batch.column(2).inner();
    let means = means.as_any().downcast_ref::<Float64Array>().unwrap();
    let keys = batch.column(3).inner();
    let keys = keys.as_any().downcast_ref::<StringArray>().unwrap();

    // First-seen key order: alfa, beta, gama.
    assert_eq!(keys.value(0), "alfa");
    assert_eq!(sums.value(0), 8);
    assert_eq!(counts.value(0), 5);
    assert!((means.value(0) - 1.6).abs() < 1e-12);

    assert_eq!(keys.value(1), "beta");
    assert_eq!(sums.value(1), 10);
    assert_eq!(counts.value(1), 2);
    assert!((means.value(1) - 5.0).abs() < 1e-12);

    assert_eq!(keys.value(2), "gama");
    assert_eq!(sums.value(2), 4);
    assert_eq!(counts.value(2), 2);
    assert!((means.value(2) - 2.0).abs() < 1e-12);
}

#[test]
fn grouped_aggregate_over_empty_input_yields_zero_rows() {
    let schema = rill::exec::test_util::groupable_schema();
    let generator: rill::exec::node::source::BatchGenerator = Box::new(|| Ok(None));
    let plan = ExecPlan::new();
    let source = plan
        .add_source(
            "source",
            rill::exec::node::source::SourceOptions::new(schema, generator),
        )
        .unwrap();
    let agg = plan
        .add_grouped_aggregate(
            "aggregate",
            source,
            vec!["str".to_string()],
            vec![Aggregate::new("hash_sum", "i32", "sum")],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    let batches = start_and_collect(&plan, &handle).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].length, 0);
    assert_eq!(batches[0].num_columns(), 2);
}

#[test]
fn scalar_aggregate_over_empty_input() {
    let schema = rill::exec::test_util::basic_schema();
    let generator: rill::exec::node::source::BatchGenerator = Box::new(|| Ok(None));
    let plan = ExecPlan::new();
    let source = plan
        .add_source(
            "source",
            rill::exec::node::source::SourceOptions::new(schema, generator),
        )
        .unwrap();
    let agg = plan
        .add_scalar_aggregate(
            "aggregate",
            source,
            vec![
                Aggregate::new("count", "i32", "count"),
                Aggregate::new("sum", "i32", "sum"),
            ],
        )
        .unwrap();
    let handle = plan.add_sink("sink", agg).unwrap();
    let batches = start_and_collect(&plan, &handle).unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    // Count of nothing is zero; sum of nothing is null under min_count = 1.
    assert_eq!(int_at(batch, 0), Some(0));
    assert_eq!(int_at(batch, 1), None);
}
