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
//! Fixtures and helpers shared by the integration tests.

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, BooleanArray, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::error::PlanResult;
use crate::exec::batch::{Datum, ExecBatch};
use crate::exec::node::sink::SinkHandle;
use crate::exec::node::source::{BatchGenerator, SourceOptions};
use crate::exec::plan::ExecPlan;

pub struct BatchesWithSchema {
    pub schema: SchemaRef,
    pub batches: Vec<ExecBatch>,
}

impl BatchesWithSchema {
    /// Pull-style generator over the batches; `slow` adds a small delay per
    /// pull to provoke interleavings.
    pub fn generator(self, slow: bool) -> BatchGenerator {
        let mut iter = self.batches.into_iter();
        Box::new(move || {
            if slow {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(iter.next())
        })
    }

    pub fn source_options(self, slow: bool, parallelism: usize) -> SourceOptions {
        let schema = Arc::clone(&self.schema);
        SourceOptions::new(schema, self.generator(slow)).with_parallelism(parallelism)
    }
}

pub fn basic_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("i32", DataType::Int32, true),
        Field::new("bool", DataType::Boolean, true),
    ]))
}

/// Two small batches with nulls in both columns.
pub fn make_basic_batches() -> BatchesWithSchema {
    let schema = basic_schema();
    let b1_i32: ArrayRef = Arc::new(Int32Array::from(vec![None, Some(4)]));
    let b1_bool: ArrayRef = Arc::new(BooleanArray::from(vec![Some(true), Some(false)]));
    let b2_i32: ArrayRef = Arc::new(Int32Array::from(vec![Some(5), Some(6), Some(7)]));
    let b2_bool: ArrayRef = Arc::new(BooleanArray::from(vec![None, Some(false), Some(true)]));
    let batches = vec![
        ExecBatch::try_new(vec![Datum::Array(b1_i32), Datum::Array(b1_bool)], 2)
            .expect("fixture batch"),
        ExecBatch::try_new(vec![Datum::Array(b2_i32), Datum::Array(b2_bool)], 3)
            .expect("fixture batch"),
    ];
    BatchesWithSchema { schema, batches }
}

/// A scalar-heavy fixture: four identical rows carried as scalars plus one
/// array batch. Flattened values are i32 = [5, 5, 5, 5, 6, 7] and
/// bool = [true, true, true, true, false, true].
pub fn make_scalar_batches() -> BatchesWithSchema {
    let schema = basic_schema();
    let first = ExecBatch {
        values: vec![Datum::scalar_i32(5), Datum::scalar_bool(true)],
        length: 4,
        tag: None,
    };
    let second_i32: ArrayRef = Arc::new(Int32Array::from(vec![6, 7]));
    let second_bool: ArrayRef = Arc::new(BooleanArray::from(vec![false, true]));
    let second = ExecBatch::try_new(
        vec![Datum::Array(second_i32), Datum::Array(second_bool)],
        2,
    )
    .expect("fixture batch");
    BatchesWithSchema {
        schema,
        batches: vec![first, second],
    }
}

pub fn groupable_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("i32", DataType::Int32, true),
        Field::new("str", DataType::Utf8, true),
    ]))
}

/// Keyed batches whose per-key sums are alfa=8, beta=10, gama=4, scaled by
/// `multiplicity` repetitions of the batch list.
pub fn make_groupable_batches(multiplicity: usize) -> BatchesWithSchema {
    let schema = groupable_schema();
    let raw: [(&[i32], &[&str]); 3] = [
        (&[12, 7, 3], &["alfa", "beta", "alfa"]),
        (&[-2, -1, 3], &["alfa", "gama", "alfa"]),
        (&[5, 3, -8], &["gama", "beta", "alfa"]),
    ];
    let mut batches = Vec::with_capacity(raw.len() * multiplicity);
    for _ in 0..multiplicity {
        for (ints, names) in &raw {
            let i32s: ArrayRef = Arc::new(Int32Array::from(ints.to_vec()));
            let strs: ArrayRef = Arc::new(StringArray::from(names.to_vec()));
            batches.push(
                ExecBatch::try_new(vec![Datum::Array(i32s), Datum::Array(strs)], ints.len())
                    .expect("fixture batch"),
            );
        }
    }
    BatchesWithSchema { schema, batches }
}

/// Deterministic pseudo-random batches, each tagged with its ordinal.
pub fn make_random_batches(num_batches: usize, batch_size: usize) -> BatchesWithSchema {
    let schema = basic_schema();
    let mut seed: u64 = 0x9e3779b97f4a7c15;
    let mut next = move || {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (seed >> 33) as u32
    };
    let mut batches = Vec::with_capacity(num_batches);
    for tag in 0..num_batches {
        let ints: Int32Array = (0..batch_size)
            .map(|_| {
                let v = next();
                (v % 8 != 0).then(|| (v % 1000) as i32)
            })
            .collect();
        let bools: BooleanArray = (0..batch_size).map(|_| Some(next() % 2 == 0)).collect();
        let batch = ExecBatch::try_new(
            vec![
                Datum::Array(Arc::new(ints) as ArrayRef),
                Datum::Array(Arc::new(bools) as ArrayRef),
            ],
            batch_size,
        )
        .expect("fixture batch")
        .with_tag(tag as i64);
        batches.push(batch);
    }
    BatchesWithSchema { schema, batches }
}

/// Start the plan, drain the sink, and surface a plan failure ahead of
/// whatever was collected.
pub fn start_and_collect(
    plan: &Arc<ExecPlan>,
    handle: &SinkHandle,
) -> PlanResult<Vec<ExecBatch>> {
    plan.start()?;
    let collected = handle.collect();
    plan.wait()?;
    collected
}

/// Flatten the i32 column of `batches` into plain values, preserving order.
pub fn flatten_i32(batches: &[ExecBatch], column: usize) -> Vec<Option<i32>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch
            .column(column)
            .to_array(batch.length)
            .expect("column materializes");
        let array = array
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("i32 column");
        out.extend(array.iter());
    }
    out
}
