// Copyright 2024 Google LLC
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives one callback per processed item, synchronously from the signing
/// worker. `percent_done` is non-decreasing and ends at 100 when every item
/// got a callback. Implementations must not block for long.
pub trait ProgressListener {
    fn on_progress(&mut self, item_name: &str, percent_done: u32);
}

/// Cooperative cancellation flag, shared between the signing worker and
/// whoever wants to stop it. The worker polls it between processing steps,
/// never mid-entry.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Counts processed items and fans percentages out to the optional listener.
pub(crate) struct ProgressTracker<'a> {
    listener: Option<&'a mut dyn ProgressListener>,
    total_items: usize,
    current_item: usize
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(
        listener: Option<&'a mut dyn ProgressListener>,
        total_items: usize
    ) -> ProgressTracker<'a> {
        ProgressTracker {
            listener,
            total_items,
            current_item: 0
        }
    }

    /// Fires one callback carrying the item's basename.
    pub(crate) fn step(&mut self, item_name: &str) {
        let short_name = item_name.rsplit('/').next().unwrap_or(item_name);
        self.current_item += 1;
        let percent_done = (100 * self.current_item / self.total_items) as u32;
        if let Some(listener) = &mut self.listener {
            listener.on_progress(short_name, percent_done);
        }
    }
}
