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
//! Execution configuration.
//!
//! Two knobs, overridable from the environment:
//! - `RILL_EXEC_THREADS`: width of the shared source worker pool.
//! - `RILL_OPERATOR_BUFFER_BATCHES`: sink channel capacity per plan.

use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub exec_threads: usize,
    pub operator_buffer_batches: usize,
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<usize>().ok().filter(|v| *v > 0)
}

fn default_exec_threads() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    // Source workers may block on a full sink buffer; keep headroom so one
    // stalled pipeline cannot starve another.
    (parallelism * 2).max(8)
}

pub fn config() -> &'static ExecConfig {
    static CONFIG: OnceLock<ExecConfig> = OnceLock::new();
    CONFIG.get_or_init(|| ExecConfig {
        exec_threads: env_usize("RILL_EXEC_THREADS").unwrap_or_else(default_exec_threads),
        operator_buffer_batches: env_usize("RILL_OPERATOR_BUFFER_BATCHES").unwrap_or(16),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let cfg = config();
        assert!(cfg.exec_threads > 0);
        assert!(cfg.operator_buffer_batches > 0);
    }
}
