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
//! Type-erased read access to the numeric arrays aggregate kernels accept.

use arrow::array::{
    Array, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, Int8Array,
};

use crate::common::error::{PlanError, PlanResult};

pub enum NumericView<'a> {
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
}

impl<'a> NumericView<'a> {
    pub fn try_new(array: &'a dyn Array) -> PlanResult<Self> {
        let any = array.as_any();
        if let Some(a) = any.downcast_ref::<Int8Array>() {
            return Ok(NumericView::Int8(a));
        }
        if let Some(a) = any.downcast_ref::<Int16Array>() {
            return Ok(NumericView::Int16(a));
        }
        if let Some(a) = any.downcast_ref::<Int32Array>() {
            return Ok(NumericView::Int32(a));
        }
        if let Some(a) = any.downcast_ref::<Int64Array>() {
            return Ok(NumericView::Int64(a));
        }
        if let Some(a) = any.downcast_ref::<Float32Array>() {
            return Ok(NumericView::Float32(a));
        }
        if let Some(a) = any.downcast_ref::<Float64Array>() {
            return Ok(NumericView::Float64(a));
        }
        Err(PlanError::not_implemented(format!(
            "numeric aggregate over {:?}",
            array.data_type()
        )))
    }

    pub fn len(&self) -> usize {
        match self {
            NumericView::Int8(a) => a.len(),
            NumericView::Int16(a) => a.len(),
            NumericView::Int32(a) => a.len(),
            NumericView::Int64(a) => a.len(),
            NumericView::Float32(a) => a.len(),
            NumericView::Float64(a) => a.len(),
        }
    }

    pub fn is_valid(&self, i: usize) -> bool {
        match self {
            NumericView::Int8(a) => a.is_valid(i),
            NumericView::Int16(a) => a.is_valid(i),
            NumericView::Int32(a) => a.is_valid(i),
            NumericView::Int64(a) => a.is_valid(i),
            NumericView::Float32(a) => a.is_valid(i),
            NumericView::Float64(a) => a.is_valid(i),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NumericView::Int8(_) | NumericView::Int16(_) | NumericView::Int32(_)
                | NumericView::Int64(_)
        )
    }

    /// Undefined for float views; callers check `is_integer` first.
    pub fn value_i64(&self, i: usize) -> i64 {
        match self {
            NumericView::Int8(a) => a.value(i) as i64,
            NumericView::Int16(a) => a.value(i) as i64,
            NumericView::Int32(a) => a.value(i) as i64,
            NumericView::Int64(a) => a.value(i),
            NumericView::Float32(a) => a.value(i) as i64,
            NumericView::Float64(a) => a.value(i) as i64,
        }
    }

    pub fn value_f64(&self, i: usize) -> f64 {
        match self {
            NumericView::Int8(a) => a.value(i) as f64,
            NumericView::Int16(a) => a.value(i) as f64,
            NumericView::Int32(a) => a.value(i) as f64,
            NumericView::Int64(a) => a.value(i) as f64,
            NumericView::Float32(a) => a.value(i) as f64,
            NumericView::Float64(a) => a.value(i),
        }
    }

    /// Width in bits of the integer representation, if integral.
    pub fn integer_bits(&self) -> Option<u32> {
        match self {
            NumericView::Int8(_) => Some(8),
            NumericView::Int16(_) => Some(16),
            NumericView::Int32(_) => Some(32),
            NumericView::Int64(_) => Some(64),
            _ => None,
        }
    }
}
