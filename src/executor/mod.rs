// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Concurrency-bounded fan-out of one action across many targets.

mod parallel;
mod prepare;
mod result_types;

pub use parallel::Executor;
pub use result_types::{
    CommandOutput, ErrorDetail, Payload, RunSummary, Status, TargetResult, TaskOutput,
    PARSE_ERROR_KIND, TASK_ERROR_KIND, WORKER_PANIC_KIND,
};
