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
//! Variance and standard deviation.
//!
//! Per-batch accumulation picks a path by input type:
//! - floats and Int64 use a two-pass mean-then-deviations sweep, Int64 with
//!   an exact i128 sum for the mean;
//! - narrower integers use a single pass over bounded chunks, keeping
//!   `sum` in i64 and `sum of squares` in i128 so both stay exact.
//!
//! Batch states combine with the textbook parallel update for (count,
//! mean, M2), which is also how `merge_from` combines worker states.

use std::any::Any;

use arrow::datatypes::DataType;

use crate::common::error::{PlanError, PlanResult};
use crate::exec::agg::view::NumericView;
use crate::exec::agg::{AggregateKernel, VarianceOptions};
use crate::exec::batch::Datum;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VarStdState {
    pub count: i64,
    pub mean: f64,
    /// Sum of squared deviations from the mean.
    pub m2: f64,
}

impl VarStdState {
    pub fn merge(&mut self, other: &VarStdState) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        let new_mean = (self.count as f64 * self.mean + other.count as f64 * other.mean)
            / total as f64;
        self.m2 += other.m2
            + delta * delta * (self.count as f64) * (other.count as f64) / total as f64;
        self.mean = new_mean;
        self.count = total;
    }
}

/// Two-pass: exact mean first, then squared deviations.
fn consume_two_pass(view: &NumericView<'_>) -> VarStdState {
    let mut count: i64 = 0;
    let mut sum: i128 = 0;
    let mut float_sum: f64 = 0.0;
    let integer = view.is_integer();
    for i in 0..view.len() {
        if !view.is_valid(i) {
            continue;
        }
        count += 1;
        if integer {
            sum += view.value_i64(i) as i128;
        } else {
            float_sum += view.value_f64(i);
        }
    }
    if count == 0 {
        return VarStdState::default();
    }
    let mean = if integer {
        sum as f64 / count as f64
    } else {
        float_sum / count as f64
    };
    let mut m2 = 0.0;
    for i in 0..view.len() {
        if view.is_valid(i) {
            let delta = view.value_f64(i) - mean;
            m2 += delta * delta;
        }
    }
    VarStdState { count, mean, m2 }
}

/// Single pass for narrow integers: within a bounded chunk, sum fits in
/// i64 and the sum of squares in i128, so M2 for the chunk is exact up to
/// the final float conversion.
fn consume_chunked_int(view: &NumericView<'_>, bits: u32) -> VarStdState {
    let max_chunk_count: i64 = 1i64 << (63 - bits);
    let mut state = VarStdState::default();
    let mut count: i64 = 0;
    let mut sum: i64 = 0;
    let mut square_sum: i128 = 0;

    fn flush(count: &mut i64, sum: &mut i64, square_sum: &mut i128, state: &mut VarStdState) {
        if *count == 0 {
            return;
        }
        let mean = *sum as f64 / *count as f64;
        let m2 = *square_sum as f64 - (*sum as f64) * (*sum as f64) / *count as f64;
        state.merge(&VarStdState {
            count: *count,
            mean,
            m2,
        });
        *count = 0;
        *sum = 0;
        *square_sum = 0;
    }

    for i in 0..view.len() {
        if !view.is_valid(i) {
            continue;
        }
        let v = view.value_i64(i);
        count += 1;
        sum += v;
        square_sum += (v as i128) * (v as i128);
        if count == max_chunk_count {
            flush(&mut count, &mut sum, &mut square_sum, &mut state);
        }
    }
    flush(&mut count, &mut sum, &mut square_sum, &mut state);
    state
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Variance,
    Stddev,
}

pub struct VarStdKernel {
    state: VarStdState,
    options: VarianceOptions,
    target: Target,
    #[allow(dead_code)]
    input_type: DataType,
}

impl VarStdKernel {
    pub fn variance(input_type: &DataType, options: VarianceOptions) -> Self {
        VarStdKernel {
            state: VarStdState::default(),
            options,
            target: Target::Variance,
            input_type: input_type.clone(),
        }
    }

    pub fn stddev(input_type: &DataType, options: VarianceOptions) -> Self {
        VarStdKernel {
            state: VarStdState::default(),
            options,
            target: Target::Stddev,
            input_type: input_type.clone(),
        }
    }

    pub fn state(&self) -> &VarStdState {
        &self.state
    }
}

impl AggregateKernel for VarStdKernel {
    fn consume(&mut self, input: &Datum, length: usize) -> PlanResult<()> {
        match input {
            Datum::Array(array) => {
                let view = NumericView::try_new(array.as_ref())?;
                let batch_state = match view.integer_bits() {
                    Some(bits) if bits < 64 => consume_chunked_int(&view, bits),
                    _ => consume_two_pass(&view),
                };
                self.state.merge(&batch_state);
            }
            Datum::Scalar(array) => {
                let view = NumericView::try_new(array.as_ref())?;
                if view.is_valid(0) && length > 0 {
                    // length identical values: mean is the value, M2 is zero.
                    self.state.merge(&VarStdState {
                        count: length as i64,
                        mean: view.value_f64(0),
                        m2: 0.0,
                    });
                }
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, other: &dyn AggregateKernel) -> PlanResult<()> {
        let other = other
            .as_any()
            .downcast_ref::<VarStdKernel>()
            .ok_or_else(|| PlanError::execution("merging mismatched variance states"))?;
        self.state.merge(&other.state);
        Ok(())
    }

    fn finalize(&self) -> PlanResult<Datum> {
        if self.state.count <= self.options.ddof {
            return Datum::null_scalar(&DataType::Float64);
        }
        let variance = self.state.m2 / (self.state.count - self.options.ddof) as f64;
        Ok(match self.target {
            Target::Variance => Datum::scalar_f64(variance),
            Target::Stddev => Datum::scalar_f64(variance.sqrt()),
        })
    }

    fn output_type(&self) -> DataType {
        DataType::Float64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, Int64Array, Int8Array};

    use super::*;

    fn finalize_f64(kernel: &VarStdKernel) -> Option<f64> {
        let out = kernel.finalize().unwrap();
        let array = out.inner().as_any().downcast_ref::<Float64Array>().unwrap();
        array.is_valid(0).then(|| array.value(0))
    }

    fn int_fixture() -> Datum {
        Datum::Array(Arc::new(Int32Array::from(vec![5, 5, 5, 5, 6, 7])) as ArrayRef)
    }

    #[test]
    fn population_variance_of_fixture() {
        let mut kernel = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        kernel.consume(&int_fixture(), 6).unwrap();
        let var = finalize_f64(&kernel).unwrap();
        assert!((var - 0.5833333333333334).abs() < 1e-12);
    }

    #[test]
    fn stddev_is_sqrt_of_variance() {
        let mut kernel = VarStdKernel::stddev(&DataType::Int32, VarianceOptions::default());
        kernel.consume(&int_fixture(), 6).unwrap();
        let std = finalize_f64(&kernel).unwrap();
        assert!((std - 0.7637626158259734).abs() < 1e-12);
    }

    #[test]
    fn sample_variance_uses_ddof() {
        let mut kernel = VarStdKernel::variance(&DataType::Int32, VarianceOptions { ddof: 1 });
        kernel.consume(&int_fixture(), 6).unwrap();
        let var = finalize_f64(&kernel).unwrap();
        assert!((var - 0.7).abs() < 1e-12);
    }

    #[test]
    fn too_few_values_for_ddof_is_null() {
        let mut kernel = VarStdKernel::variance(&DataType::Int32, VarianceOptions { ddof: 1 });
        let one = Datum::Array(Arc::new(Int32Array::from(vec![42])) as ArrayRef);
        kernel.consume(&one, 1).unwrap();
        assert_eq!(finalize_f64(&kernel), None);

        let empty = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        assert_eq!(finalize_f64(&empty), None);
    }

    #[test]
    fn nulls_are_skipped() {
        let mut kernel = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        let values = Datum::Array(Arc::new(Int32Array::from(vec![
            Some(1),
            None,
            Some(3),
        ])) as ArrayRef);
        kernel.consume(&values, 3).unwrap();
        let var = finalize_f64(&kernel).unwrap();
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn batchwise_consume_matches_single_batch() {
        let mut whole = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        whole.consume(&int_fixture(), 6).unwrap();

        let mut split = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        let first = Datum::Array(Arc::new(Int32Array::from(vec![5, 5])) as ArrayRef);
        let second = Datum::Array(Arc::new(Int32Array::from(vec![5, 5, 6, 7])) as ArrayRef);
        split.consume(&first, 2).unwrap();
        split.consume(&second, 4).unwrap();

        let a = finalize_f64(&whole).unwrap();
        let b = finalize_f64(&split).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn merge_matches_sequential_consume() {
        let mut left = VarStdKernel::variance(&DataType::Int64, VarianceOptions::default());
        let mut right = VarStdKernel::variance(&DataType::Int64, VarianceOptions::default());
        let a = Datum::Array(Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef);
        let b = Datum::Array(Arc::new(Int64Array::from(vec![10, 20, 30])) as ArrayRef);
        left.consume(&a, 3).unwrap();
        right.consume(&b, 3).unwrap();
        left.merge_from(&right).unwrap();

        let mut sequential = VarStdKernel::variance(&DataType::Int64, VarianceOptions::default());
        let all = Datum::Array(Arc::new(Int64Array::from(vec![1, 2, 3, 10, 20, 30])) as ArrayRef);
        sequential.consume(&all, 6).unwrap();

        let merged = finalize_f64(&left).unwrap();
        let direct = finalize_f64(&sequential).unwrap();
        assert!((merged - direct).abs() < 1e-9);
    }

    #[test]
    fn merging_into_empty_adopts_the_other_state() {
        let mut empty = VarStdKernel::variance(&DataType::Float64, VarianceOptions::default());
        let mut full = VarStdKernel::variance(&DataType::Float64, VarianceOptions::default());
        let values = Datum::Array(Arc::new(Float64Array::from(vec![1.5, 2.5, 4.0])) as ArrayRef);
        full.consume(&values, 3).unwrap();
        empty.merge_from(&full).unwrap();
        assert_eq!(empty.state(), full.state());
    }

    #[test]
    fn narrow_integers_take_the_chunked_path() {
        let mut kernel = VarStdKernel::variance(&DataType::Int8, VarianceOptions::default());
        let values = Datum::Array(Arc::new(Int8Array::from(vec![5, 5, 5, 5, 6, 7])) as ArrayRef);
        kernel.consume(&values, 6).unwrap();
        let var = finalize_f64(&kernel).unwrap();
        assert!((var - 0.5833333333333334).abs() < 1e-12);
    }

    #[test]
    fn scalar_consume_contributes_zero_spread() {
        let mut kernel = VarStdKernel::variance(&DataType::Int32, VarianceOptions::default());
        kernel.consume(&Datum::scalar_i32(5), 4).unwrap();
        kernel
            .consume(
                &Datum::Array(Arc::new(Int32Array::from(vec![6, 7])) as ArrayRef),
                2,
            )
            .unwrap();
        let var = finalize_f64(&kernel).unwrap();
        assert!((var - 0.5833333333333334).abs() < 1e-12);
    }
}
