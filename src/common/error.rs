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
//! Tagged error surface for the execution core.
//!
//! Every fallible operation returns `PlanResult<T>`; failures carry a kind
//! plus a human-readable message, never a sentinel mixed into normal results.

use arrow::error::ArrowError;
use thiserror::Error;

/// Canonical result for the execution core.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Malformed graph or misuse: unbound output, empty graph, double-start,
    /// unresolvable column reference.
    #[error("Invalid: {0}")]
    Invalid(String),

    /// An aggregate or kernel was requested for an unsupported input type.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Failure raised by a user-supplied source during production.
    #[error("IOError: {0}")]
    IoError(String),

    /// Failure raised by an operator while processing batches.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Not a true error: cooperative teardown observed mid-pull.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotImplemented,
    IoError,
    ExecutionError,
    Cancelled,
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::Invalid(_) => ErrorKind::Invalid,
            PlanError::NotImplemented(_) => ErrorKind::NotImplemented,
            PlanError::IoError(_) => ErrorKind::IoError,
            PlanError::ExecutionError(_) => ErrorKind::ExecutionError,
            PlanError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        PlanError::Invalid(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        PlanError::NotImplemented(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        PlanError::ExecutionError(msg.into())
    }

    pub fn message(&self) -> &str {
        match self {
            PlanError::Invalid(m)
            | PlanError::NotImplemented(m)
            | PlanError::IoError(m)
            | PlanError::ExecutionError(m)
            | PlanError::Cancelled(m) => m,
        }
    }
}

impl From<ArrowError> for PlanError {
    fn from(e: ArrowError) -> Self {
        PlanError::ExecutionError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_message_are_preserved() {
        let err = PlanError::invalid("plan has no nodes");
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(err.message(), "plan has no nodes");
        assert_eq!(err.to_string(), "Invalid: plan has no nodes");
    }

    #[test]
    fn arrow_errors_map_to_execution() {
        let err: PlanError = ArrowError::ComputeError("boom".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
    }
}
