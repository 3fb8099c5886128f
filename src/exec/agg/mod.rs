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
//! Aggregate kernels and their registry.
//!
//! A kernel is a small state machine: `consume` folds batch columns into
//! state, `merge_from` combines states built independently, `finalize`
//! emits a one-row scalar. Grouped aggregation runs one kernel instance per
//! group; the registry hands out factories so instances can be created
//! lazily as groups appear.

pub mod functions;
pub mod view;

use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::DataType;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::batch::Datum;

/// Options shared by simple scalar aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarAggregateOptions {
    /// When false, a single null input poisons the result to null.
    pub skip_nulls: bool,
    /// Minimum number of consumed non-null values for a non-null result.
    pub min_count: usize,
}

impl Default for ScalarAggregateOptions {
    fn default() -> Self {
        ScalarAggregateOptions {
            skip_nulls: true,
            min_count: 1,
        }
    }
}

/// Options for variance and stddev.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceOptions {
    /// Delta degrees of freedom: 0 for population, 1 for sample.
    pub ddof: i64,
}

impl Default for VarianceOptions {
    fn default() -> Self {
        VarianceOptions { ddof: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOptions {
    Scalar(ScalarAggregateOptions),
    Variance(VarianceOptions),
}

/// Incremental aggregate state.
///
/// `merge_from` requires `other` to be the same concrete kernel; the
/// registry guarantees this by building all instances of one aggregate
/// from one factory.
pub trait AggregateKernel: Send {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()>;
    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()>;
    /// Emit the result as a length-1 scalar. Soft failures (too few values,
    /// poisoned state) surface as a null scalar, not an error.
    fn finalize(&self) -> PlanResult<Datum>;
    fn output_type(&self) -> DataType;
    fn as_any(&self) -> &dyn Any;
}

pub type KernelInit = Arc<dyn Fn() -> Box<dyn AggregateKernel> + Send + Sync>;

fn base_function(name: &str) -> &str {
    // Grouped variants reuse the scalar kernels one instance per group.
    name.strip_prefix("hash_").unwrap_or(name)
}

pub fn default_options(name: &str) -> PlanResult<AggregateOptions> {
    match base_function(name) {
        "count" | "sum" | "product" | "mean" | "any" | "all" => {
            Ok(AggregateOptions::Scalar(ScalarAggregateOptions::default()))
        }
        "variance" | "stddev" => Ok(AggregateOptions::Variance(VarianceOptions::default())),
        other => Err(PlanError::not_implemented(format!(
            "aggregate function '{}'",
            other
        ))),
    }
}

/// The output type of `name` applied to `input_type`.
pub fn output_type(name: &str, input_type: &DataType) -> PlanResult<DataType> {
    let base = base_function(name);
    match base {
        "count" => Ok(DataType::Int64),
        "sum" | "product" => match input_type {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                Ok(DataType::Int64)
            }
            DataType::Float32 | DataType::Float64 => Ok(DataType::Float64),
            other => Err(PlanError::not_implemented(format!(
                "{} over {:?}",
                base, other
            ))),
        },
        "mean" | "variance" | "stddev" => match input_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64 => Ok(DataType::Float64),
            other => Err(PlanError::not_implemented(format!(
                "{} over {:?}",
                base, other
            ))),
        },
        "any" | "all" => match input_type {
            DataType::Boolean => Ok(DataType::Boolean),
            other => Err(PlanError::not_implemented(format!(
                "{} over {:?}",
                base, other
            ))),
        },
        other => Err(PlanError::not_implemented(format!(
            "aggregate function '{}'",
            other
        ))),
    }
}

/// Build a factory producing fresh kernel instances for `name` over
/// `input_type`. `options` of the wrong shape for the function is invalid.
pub fn make_kernel_init(
    name: &str,
    input_type: &DataType,
    options: Option<AggregateOptions>,
) -> PlanResult<KernelInit> {
    // Validates the type combination up front so plan construction fails
    // early instead of the first consume.
    output_type(name, input_type)?;
    let base = base_function(name);

    let scalar_options = |options: Option<AggregateOptions>| -> PlanResult<ScalarAggregateOptions> {
        match options {
            None => Ok(ScalarAggregateOptions::default()),
            Some(AggregateOptions::Scalar(opts)) => Ok(opts),
            Some(other) => Err(PlanError::invalid(format!(
                "options {:?} do not apply to '{}'",
                other, base
            ))),
        }
    };
    let variance_options = |options: Option<AggregateOptions>| -> PlanResult<VarianceOptions> {
        match options {
            None => Ok(VarianceOptions::default()),
            Some(AggregateOptions::Variance(opts)) => Ok(opts),
            Some(other) => Err(PlanError::invalid(format!(
                "options {:?} do not apply to '{}'",
                other, base
            ))),
        }
    };

    match base {
        "count" => {
            // Count takes no tuning, but reject options meant for another
            // function all the same.
            scalar_options(options)?;
            Ok(Arc::new(|| Box::new(functions::count::CountKernel::new())))
        }
        "sum" => {
            let opts = scalar_options(options)?;
            let input = input_type.clone();
            Ok(Arc::new(move || {
                Box::new(functions::sum::SumKernel::new(&input, opts.clone()))
            }))
        }
        "product" => {
            let opts = scalar_options(options)?;
            let input = input_type.clone();
            Ok(Arc::new(move || {
                Box::new(functions::sum::ProductKernel::new(&input, opts.clone()))
            }))
        }
        "mean" => {
            let opts = scalar_options(options)?;
            let input = input_type.clone();
            Ok(Arc::new(move || {
                Box::new(functions::sum::MeanKernel::new(&input, opts.clone()))
            }))
        }
        "any" => {
            let opts = scalar_options(options)?;
            Ok(Arc::new(move || {
                Box::new(functions::boolean::AnyKernel::new(opts.clone()))
            }))
        }
        "all" => {
            let opts = scalar_options(options)?;
            Ok(Arc::new(move || {
                Box::new(functions::boolean::AllKernel::new(opts.clone()))
            }))
        }
        "variance" => {
            let opts = variance_options(options)?;
            let input = input_type.clone();
            Ok(Arc::new(move || {
                Box::new(functions::variance::VarStdKernel::variance(
                    &input,
                    opts.clone(),
                ))
            }))
        }
        "stddev" => {
            let opts = variance_options(options)?;
            let input = input_type.clone();
            Ok(Arc::new(move || {
                Box::new(functions::variance::VarStdKernel::stddev(
                    &input,
                    opts.clone(),
                ))
            }))
        }
        other => Err(PlanError::not_implemented(format!(
            "aggregate function '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_prefix_resolves_to_base_function() {
        assert_eq!(
            output_type("hash_sum", &DataType::Int32).unwrap(),
            DataType::Int64
        );
        assert_eq!(
            output_type("hash_count", &DataType::Utf8).unwrap(),
            DataType::Int64
        );
    }

    #[test]
    fn unknown_function_is_not_implemented() {
        let err = make_kernel_init("tdigest", &DataType::Float64, None).err().unwrap();
        assert!(matches!(err, PlanError::NotImplemented(_)));
    }

    #[test]
    fn unsupported_input_type_is_not_implemented() {
        let err = make_kernel_init("sum", &DataType::Utf8, None).err().unwrap();
        assert!(matches!(err, PlanError::NotImplemented(_)));
        let err = make_kernel_init("any", &DataType::Int32, None).err().unwrap();
        assert!(matches!(err, PlanError::NotImplemented(_)));
    }

    #[test]
    fn mismatched_options_are_invalid() {
        let err = make_kernel_init(
            "sum",
            &DataType::Int32,
            Some(AggregateOptions::Variance(VarianceOptions::default())),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[test]
    fn factories_produce_independent_instances() {
        let init = make_kernel_init("count", &DataType::Int32, None).unwrap();
        let mut a = init();
        let b = init();
        a.consume(&Datum::scalar_i32(1), 5).unwrap();
        let a_out = a.finalize().unwrap();
        let b_out = b.finalize().unwrap();
        assert_ne!(a_out, b_out);
    }
}
