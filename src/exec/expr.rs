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
//! Row-level scalar expressions used by filter and project nodes.
//!
//! Evaluation delegates to arrow compute kernels, so scalar broadcast and
//! null propagation follow arrow semantics. A result stays scalar only when
//! every input to the expression is scalar.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array};
use arrow::compute::kernels::boolean;
use arrow::compute::kernels::cmp;
use arrow::compute::kernels::numeric;
use arrow::datatypes::{DataType, Schema};

use crate::common::error::{PlanError, PlanResult};
use crate::exec::batch::{Datum, ExecBatch};

#[derive(Debug, Clone)]
pub enum Expr {
    /// Reference to an input column by name.
    Field(String),
    /// A constant; the array has length 1.
    Literal(ArrayRef),
    Eq(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    GtEq(Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Multiply(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

pub fn field_ref(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

pub fn literal_i32(v: i32) -> Expr {
    Expr::Literal(Arc::new(Int32Array::from(vec![v])))
}

pub fn literal_i64(v: i64) -> Expr {
    Expr::Literal(Arc::new(Int64Array::from(vec![v])))
}

pub fn literal_f64(v: f64) -> Expr {
    Expr::Literal(Arc::new(Float64Array::from(vec![v])))
}

pub fn literal_bool(v: bool) -> Expr {
    Expr::Literal(Arc::new(BooleanArray::from(vec![v])))
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Eq(Box::new(lhs), Box::new(rhs))
}

pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Gt(Box::new(lhs), Box::new(rhs))
}

pub fn gt_eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::GtEq(Box::new(lhs), Box::new(rhs))
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Add(Box::new(lhs), Box::new(rhs))
}

pub fn multiply(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Multiply(Box::new(lhs), Box::new(rhs))
}

pub fn not(operand: Expr) -> Expr {
    Expr::Not(Box::new(operand))
}

impl Expr {
    fn resolve_field<'a>(schema: &'a Schema, name: &str) -> PlanResult<(usize, &'a DataType)> {
        let (idx, field) = schema
            .column_with_name(name)
            .ok_or_else(|| PlanError::invalid(format!("no column named '{}' in input", name)))?;
        Ok((idx, field.data_type()))
    }

    /// The output type of this expression against `schema`.
    pub fn result_type(&self, schema: &Schema) -> PlanResult<DataType> {
        match self {
            Expr::Field(name) => {
                let (_, dt) = Self::resolve_field(schema, name)?;
                Ok(dt.clone())
            }
            Expr::Literal(array) => Ok(array.data_type().clone()),
            Expr::Eq(_, _) | Expr::Gt(_, _) | Expr::GtEq(_, _) | Expr::Not(_) => {
                Ok(DataType::Boolean)
            }
            Expr::Add(lhs, rhs) | Expr::Multiply(lhs, rhs) => {
                let lt = lhs.result_type(schema)?;
                let rt = rhs.result_type(schema)?;
                if lt != rt {
                    return Err(PlanError::not_implemented(format!(
                        "arithmetic between {:?} and {:?}",
                        lt, rt
                    )));
                }
                Ok(lt)
            }
        }
    }

    /// Evaluate against one batch laid out per `schema`.
    pub fn evaluate(&self, batch: &ExecBatch, schema: &Schema) -> PlanResult<Datum> {
        match self {
            Expr::Field(name) => {
                let (idx, _) = Self::resolve_field(schema, name)?;
                if idx >= batch.num_columns() {
                    return Err(PlanError::execution(format!(
                        "batch has {} columns, column '{}' resolves to {}",
                        batch.num_columns(),
                        name,
                        idx
                    )));
                }
                Ok(batch.column(idx).clone())
            }
            Expr::Literal(array) => Ok(Datum::Scalar(Arc::clone(array))),
            Expr::Eq(lhs, rhs) => self.evaluate_cmp(batch, schema, lhs, rhs, cmp::eq),
            Expr::Gt(lhs, rhs) => self.evaluate_cmp(batch, schema, lhs, rhs, cmp::gt),
            Expr::GtEq(lhs, rhs) => self.evaluate_cmp(batch, schema, lhs, rhs, cmp::gt_eq),
            Expr::Add(lhs, rhs) => self.evaluate_arith(batch, schema, lhs, rhs, numeric::add),
            Expr::Multiply(lhs, rhs) => self.evaluate_arith(batch, schema, lhs, rhs, numeric::mul),
            Expr::Not(operand) => {
                let value = operand.evaluate(batch, schema)?;
                let bools = value
                    .inner()
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| {
                        PlanError::invalid(format!(
                            "NOT expects a boolean operand, got {:?}",
                            value.data_type()
                        ))
                    })?;
                let negated: ArrayRef = Arc::new(boolean::not(bools)?);
                Ok(match value {
                    Datum::Scalar(_) => Datum::Scalar(negated),
                    Datum::Array(_) => Datum::Array(negated),
                })
            }
        }
    }

    fn evaluate_cmp(
        &self,
        batch: &ExecBatch,
        schema: &Schema,
        lhs: &Expr,
        rhs: &Expr,
        kernel: impl Fn(
            &dyn arrow::array::Datum,
            &dyn arrow::array::Datum,
        ) -> Result<BooleanArray, arrow::error::ArrowError>,
    ) -> PlanResult<Datum> {
        let left = lhs.evaluate(batch, schema)?;
        let right = rhs.evaluate(batch, schema)?;
        let result: ArrayRef = Arc::new(kernel(&left, &right)?);
        Ok(if left.is_scalar() && right.is_scalar() {
            Datum::Scalar(result)
        } else {
            Datum::Array(result)
        })
    }

    fn evaluate_arith(
        &self,
        batch: &ExecBatch,
        schema: &Schema,
        lhs: &Expr,
        rhs: &Expr,
        kernel: impl Fn(
            &dyn arrow::array::Datum,
            &dyn arrow::array::Datum,
        ) -> Result<ArrayRef, arrow::error::ArrowError>,
    ) -> PlanResult<Datum> {
        let left = lhs.evaluate(batch, schema)?;
        let right = rhs.evaluate(batch, schema)?;
        let result = kernel(&left, &right)?;
        Ok(if left.is_scalar() && right.is_scalar() {
            Datum::Scalar(result)
        } else {
            Datum::Array(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::Field;

    use super::*;

    fn test_schema() -> Schema {
        Schema::new(vec![
            Field::new("i32", DataType::Int32, true),
            Field::new("bool", DataType::Boolean, true),
        ])
    }

    fn test_batch() -> ExecBatch {
        let ints: ArrayRef = Arc::new(Int32Array::from(vec![Some(4), Some(5), None, Some(6)]));
        let bools: ArrayRef = Arc::new(BooleanArray::from(vec![
            Some(true),
            Some(false),
            Some(true),
            None,
        ]));
        ExecBatch::try_new(vec![Datum::Array(ints), Datum::Array(bools)], 4).unwrap()
    }

    #[test]
    fn field_ref_returns_the_column() {
        let batch = test_batch();
        let value = field_ref("i32").evaluate(&batch, &test_schema()).unwrap();
        assert_eq!(&value, batch.column(0));
    }

    #[test]
    fn unknown_field_is_invalid() {
        let err = field_ref("missing")
            .evaluate(&test_batch(), &test_schema())
            .unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[test]
    fn eq_against_literal_propagates_nulls() {
        let expr = eq(field_ref("i32"), literal_i32(5));
        let value = expr.evaluate(&test_batch(), &test_schema()).unwrap();
        assert!(!value.is_scalar());
        let bools = value
            .inner()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .unwrap();
        assert_eq!(
            bools.iter().collect::<Vec<_>>(),
            vec![Some(false), Some(true), None, Some(false)]
        );
    }

    #[test]
    fn arithmetic_broadcasts_scalar_rhs() {
        let expr = add(field_ref("i32"), literal_i32(10));
        let value = expr.evaluate(&test_batch(), &test_schema()).unwrap();
        let ints = value.inner().as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(
            ints.iter().collect::<Vec<_>>(),
            vec![Some(14), Some(15), None, Some(16)]
        );
    }

    #[test]
    fn scalar_only_expression_stays_scalar() {
        let expr = multiply(literal_i64(6), literal_i64(7));
        let value = expr.evaluate(&test_batch(), &test_schema()).unwrap();
        assert!(value.is_scalar());
        let ints = value.inner().as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ints.value(0), 42);
    }

    #[test]
    fn not_requires_boolean() {
        let err = not(field_ref("i32"))
            .evaluate(&test_batch(), &test_schema())
            .unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[test]
    fn result_type_threads_through_schema() {
        let schema = test_schema();
        assert_eq!(
            field_ref("i32").result_type(&schema).unwrap(),
            DataType::Int32
        );
        assert_eq!(
            gt(field_ref("i32"), literal_i32(0))
                .result_type(&schema)
                .unwrap(),
            DataType::Boolean
        );
        assert_eq!(
            add(field_ref("i32"), literal_i32(1))
                .result_type(&schema)
                .unwrap(),
            DataType::Int32
        );
    }
}
