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

use std::any::Any;

use arrow::array::Array;
use arrow::datatypes::DataType;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::agg::AggregateKernel;
use crate::exec::batch::Datum;

/// Counts non-null values. Works over any input type; never finalizes to
/// null, an empty input counts as 0. Counting is unconditional, so the
/// scalar aggregate options have nothing to configure here.
pub struct CountKernel {
    count: i64,
}

impl CountKernel {
    pub fn new() -> Self {
        CountKernel { count: 0 }
    }
}

impl Default for CountKernel {
    fn default() -> Self {
        CountKernel::new()
    }
}

impl AggregateKernel for CountKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        match input {
            Datum::Array(a) => {
                self.count += (a.len() - a.null_count()) as i64;
            }
            Datum::Scalar(a) => {
                if a.is_valid(0) {
                    self.count += length as i64;
                }
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<CountKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched count states"))?;
        self.count += other.count;
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        Ok(Datum::scalar_i64(self.count))
    }

    fn output_type(&self) -> DataType {
        DataType::Int64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array, Int64Array};

    use super::*;

    fn count_of(datum: &Datum, length: usize) -> i64 {
        let mut kernel = CountKernel::new();
        kernel.consume(datum, length).unwrap();
        let out = kernel.finalize().unwrap();
        out.inner()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0)
    }

    #[test]
    fn counts_only_valid_values() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]));
        assert_eq!(count_of(&Datum::Array(array), 3), 2);
    }

    #[test]
    fn valid_scalar_counts_once_per_row() {
        assert_eq!(count_of(&Datum::scalar_i32(9), 4), 4);
        let null = Datum::null_scalar(&DataType::Int32).unwrap();
        assert_eq!(count_of(&null, 4), 0);
    }

    #[test]
    fn empty_input_finalizes_to_zero_not_null() {
        let kernel = CountKernel::new();
        let out = kernel.finalize().unwrap();
        assert!(out.inner().is_valid(0));
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = CountKernel::new();
        let mut b = CountKernel::new();
        a.consume(&Datum::scalar_i32(1), 2).unwrap();
        b.consume(&Datum::scalar_i32(1), 3).unwrap();
        a.merge_from(&b).unwrap();
        let out = a.finalize().unwrap();
        let v = out
            .inner()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0);
        assert_eq!(v, 5);
    }
}
