// Copyright 2025 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

//! Repository-scoped event dispatch.
//!
//! Every mutating operation dispatches a preventable pre-event before the
//! mutation and an informational post-event after it. Listeners for a single
//! event fire in registration order. A pre-event listener cancels by setting
//! an error on the event; the operation then fails with `EventCancelled`.
//! Post-events are non-cancelable.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RepoError;
use crate::error::RepoResult;

/// The event passed to listeners.
#[derive(Debug)]
pub struct Event {
    name: String,
    detail: Value,
    cancel_reason: Option<String>,
    cancelable: bool,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Cancels the operation. No-op on post-events.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        if self.cancelable && self.cancel_reason.is_none() {
            self.cancel_reason = Some(reason.into());
        }
    }
}

type Listener = Box<dyn FnMut(&mut Event)>;

/// Listener registry scoped to one repository instance.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: HashMap<String, Vec<Listener>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `event`. Listeners fire in registration
    /// order.
    pub fn on(&mut self, event: impl Into<String>, listener: impl FnMut(&mut Event) + 'static) {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(listener));
    }

    /// Dispatches the preventable pre-event for `operation`. Returns
    /// `EventCancelled` if any listener cancelled.
    pub fn dispatch_pre(&mut self, operation: &str, detail: Value) -> RepoResult<()> {
        let name = format!("pre-{operation}");
        let mut event = Event {
            name: name.clone(),
            detail,
            cancel_reason: None,
            cancelable: true,
        };
        self.dispatch(&mut event);
        match event.cancel_reason {
            Some(reason) => Err(RepoError::EventCancelled {
                event: operation.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Dispatches the informational post-event for `operation`.
    pub fn dispatch_post(&mut self, operation: &str, detail: Value) {
        let mut event = Event {
            name: format!("post-{operation}"),
            detail,
            cancel_reason: None,
            cancelable: false,
        };
        self.dispatch(&mut event);
    }

    fn dispatch(&mut self, event: &mut Event) {
        let Some(listeners) = self.listeners.get_mut(event.name()) else {
            return;
        };
        for listener in listeners {
            listener(event);
        }
    }
}
