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
//! Aggregation nodes.
//!
//! Scalar aggregation reduces the whole input to one row. Grouped
//! aggregation keys rows through a `Grouper` and keeps one kernel instance
//! per (aggregate, group); its output columns are the aggregates followed
//! by the key columns, rows ordered by first appearance of each key.

use std::sync::{Arc, Mutex};

use arrow::array::{new_empty_array, ArrayRef};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::error::{PlanError, PlanResult};
use crate::exec::agg::{self, AggregateKernel, AggregateOptions, KernelInit};
use crate::exec::batch::{Datum, ExecBatch};
use crate::exec::grouper::Grouper;

/// One requested aggregate: `function(target) as name`.
#[derive(Clone)]
pub struct Aggregate {
    pub function: String,
    pub options: Option<AggregateOptions>,
    pub target: String,
    pub name: String,
}

impl Aggregate {
    pub fn new(
        function: impl Into<String>,
        target: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Aggregate {
            function: function.into(),
            options: None,
            target: target.into(),
            name: name.into(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = Some(options);
        self
    }
}

struct ResolvedAggregate {
    init: KernelInit,
    target: usize,
    output_field: Field,
}

fn resolve_aggregates(
    aggregates: &[Aggregate],
    input_schema: &Schema,
) -> PlanResult<Vec<ResolvedAggregate>> {
    if aggregates.is_empty() {
        return Err(PlanError::invalid("aggregation requires at least one aggregate"));
    }
    aggregates
        .iter()
        .map(|aggregate| {
            let (target, field) = input_schema
                .column_with_name(&aggregate.target)
                .ok_or_else(|| {
                    PlanError::invalid(format!(
                        "no column named '{}' to aggregate",
                        aggregate.target
                    ))
                })?;
            let input_type = field.data_type();
            let init = agg::make_kernel_init(
                &aggregate.function,
                input_type,
                aggregate.options.clone(),
            )?;
            let output_type = agg::output_type(&aggregate.function, input_type)?;
            Ok(ResolvedAggregate {
                init,
                target,
                output_field: Field::new(&aggregate.name, output_type, true),
            })
        })
        .collect()
}

pub struct ScalarAggregateState {
    resolved: Vec<ResolvedAggregate>,
    kernels: Mutex<Vec<Box<dyn AggregateKernel>>>,
}

impl ScalarAggregateState {
    pub(crate) fn try_new(
        aggregates: Vec<Aggregate>,
        input_schema: &SchemaRef,
    ) -> PlanResult<(Self, SchemaRef)> {
        let resolved = resolve_aggregates(&aggregates, input_schema)?;
        let schema = Arc::new(Schema::new(
            resolved
                .iter()
                .map(|r| r.output_field.clone())
                .collect::<Vec<_>>(),
        ));
        let kernels = resolved.iter().map(|r| (r.init)()).collect();
        Ok((
            ScalarAggregateState {
                resolved,
                kernels: Mutex::new(kernels),
            },
            schema,
        ))
    }

    pub(crate) fn consume(&self, batch: &ExecBatch) -> PlanResult<()> {
        let mut kernels = self.kernels.lock().expect("aggregate kernels");
        for (kernel, resolved) in kernels.iter_mut().zip(self.resolved.iter()) {
            kernel.consume(batch.column(resolved.target), batch.length)?;
        }
        Ok(())
    }

    /// One row of scalars, in declaration order.
    pub(crate) fn finish(&self) -> PlanResult<ExecBatch> {
        let kernels = self.kernels.lock().expect("aggregate kernels");
        let values = kernels
            .iter()
            .map(|kernel| kernel.finalize())
            .collect::<PlanResult<Vec<_>>>()?;
        ExecBatch::try_new(values, 1)
    }
}

struct GroupedInner {
    grouper: Grouper,
    /// `states[group][aggregate]`, groups indexed by grouper id.
    states: Vec<Vec<Box<dyn AggregateKernel>>>,
}

pub struct GroupedAggregateState {
    resolved: Vec<ResolvedAggregate>,
    key_indices: Vec<usize>,
    key_types: Vec<DataType>,
    inner: Mutex<GroupedInner>,
}

impl GroupedAggregateState {
    pub(crate) fn try_new(
        keys: Vec<String>,
        aggregates: Vec<Aggregate>,
        input_schema: &SchemaRef,
    ) -> PlanResult<(Self, SchemaRef)> {
        if keys.is_empty() {
            return Err(PlanError::invalid("grouped aggregation requires at least one key"));
        }
        let resolved = resolve_aggregates(&aggregates, input_schema)?;
        let mut key_indices = Vec::with_capacity(keys.len());
        let mut key_types = Vec::with_capacity(keys.len());
        let mut fields: Vec<Field> = resolved.iter().map(|r| r.output_field.clone()).collect();
        for key in &keys {
            let (idx, field) = input_schema.column_with_name(key).ok_or_else(|| {
                PlanError::invalid(format!("no column named '{}' to group by", key))
            })?;
            key_indices.push(idx);
            key_types.push(field.data_type().clone());
            fields.push(field.clone());
        }
        let grouper = Grouper::try_new(&key_types)?;
        let schema = Arc::new(Schema::new(fields));
        Ok((
            GroupedAggregateState {
                resolved,
                key_indices,
                key_types,
                inner: Mutex::new(GroupedInner {
                    grouper,
                    states: Vec::new(),
                }),
            },
            schema,
        ))
    }

    pub(crate) fn consume(&self, batch: &ExecBatch) -> PlanResult<()> {
        if batch.length == 0 {
            return Ok(());
        }
        let keys = self
            .key_indices
            .iter()
            .map(|idx| batch.column(*idx).to_array(batch.length))
            .collect::<PlanResult<Vec<_>>>()?;

        let mut inner = self.inner.lock().expect("grouped aggregate state");
        let ids = inner.grouper.consume(&keys)?;
        let num_groups = inner.grouper.num_groups();
        while inner.states.len() < num_groups as usize {
            inner
                .states
                .push(self.resolved.iter().map(|r| (r.init)()).collect());
        }
        let groupings = Grouper::make_groupings(&ids, num_groups)?;
        for (agg_idx, resolved) in self.resolved.iter().enumerate() {
            let values = batch.column(resolved.target).to_array(batch.length)?;
            let parts = Grouper::apply_groupings(&groupings, &values)?;
            for (group, part) in parts.into_iter().enumerate() {
                if part.is_empty() {
                    continue;
                }
                let length = part.len();
                inner.states[group][agg_idx]
                    .consume(&Datum::Array(part), length)?;
            }
        }
        Ok(())
    }

    /// One row per group, keys ordered by first appearance.
    pub(crate) fn finish(&self) -> PlanResult<ExecBatch> {
        let inner = self.inner.lock().expect("grouped aggregate state");
        let num_groups = inner.grouper.num_groups() as usize;
        let mut columns: Vec<Datum> = Vec::with_capacity(self.resolved.len() + self.key_indices.len());
        for (agg_idx, resolved) in self.resolved.iter().enumerate() {
            let column: ArrayRef = if num_groups == 0 {
                new_empty_array(resolved.output_field.data_type())
            } else {
                let per_group = inner
                    .states
                    .iter()
                    .map(|group| group[agg_idx].finalize()?.to_array(1))
                    .collect::<PlanResult<Vec<_>>>()?;
                let refs: Vec<&dyn arrow::array::Array> =
                    per_group.iter().map(|a| a.as_ref()).collect();
                compute::concat(&refs)?
            };
            columns.push(Datum::Array(column));
        }
        let uniques = if num_groups == 0 {
            self.key_types.iter().map(|dt| new_empty_array(dt)).collect()
        } else {
            inner.grouper.get_uniques()?
        };
        for key_column in uniques {
            columns.push(Datum::Array(key_column));
        }
        ExecBatch::try_new(columns, num_groups)
    }
}
