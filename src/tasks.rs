//! Resumable per-tick tasks.
//!
//! Multi-frame behaviour (retrying a device lookup, easing an object back to
//! its origin, rewinding an animation) is expressed as a task state stored in
//! a [`TaskSlot`]. A system resumes the task once per tick through
//! [`TaskSlot::step`]. Starting a new task in the same slot supersedes the old
//! one, and any [`TaskToken`] handed out for the old task stops being live.

/// Result of resuming a task for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task wants to be resumed on the next tick.
    Pending,
    /// The task finished and can be discarded.
    Done,
}

/// Identifies one started task. Compare against the slot with
/// [`TaskSlot::is_live`] to learn whether it was superseded or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskToken(u64);

/// Storage for at most one running task of state `S`.
#[derive(Debug, Clone)]
pub struct TaskSlot<S> {
    state: Option<S>,
    generation: u64,
}

impl<S> Default for TaskSlot<S> {
    fn default() -> Self {
        Self {
            state: None,
            generation: 0,
        }
    }
}

impl<S> TaskSlot<S> {
    /// Start a task, cancelling whatever was running in this slot.
    pub fn start(&mut self, state: S) -> TaskToken {
        self.generation = self.generation.wrapping_add(1);
        self.state = Some(state);
        TaskToken(self.generation)
    }

    /// Drop the running task, if any.
    pub fn cancel(&mut self) {
        if self.state.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    /// Whether a task is currently running.
    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    /// Whether `token` refers to the task currently running in this slot.
    pub fn is_live(&self, token: TaskToken) -> bool {
        self.state.is_some() && token.0 == self.generation
    }

    /// Borrow the running task state.
    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    /// Resume the running task once. Finished tasks are cleared.
    ///
    /// Returns `None` when no task is running.
    pub fn step(&mut self, resume: impl FnOnce(&mut S) -> TaskStatus) -> Option<TaskStatus> {
        let state = self.state.as_mut()?;
        let status = resume(state);
        if status == TaskStatus::Done {
            self.state = None;
        }
        Some(status)
    }
}
