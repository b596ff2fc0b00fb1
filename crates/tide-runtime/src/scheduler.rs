//! Single-threaded round-robin scheduler
//!
//! Every task owns an [`Executor`] and therefore its own register stack.
//! A turn is exactly one drain of the task at the front of the queue; a
//! task that pauses goes to the back. Interleaving comes entirely from
//! suspension, with no threads involved.

use crate::error::RuntimeError;
use std::collections::VecDeque;
use tide_engine::{Drain, EngineConfig, ExecError, Executor, FunctionRef, SuspendReason, Value};
use tracing::{debug, trace, warn};

/// Identifier of a task within one scheduler
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// State of a queued task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Spawned, not drained yet
    Created,
    /// Paused at the end of its last turn
    Suspended(SuspendReason),
}

struct Task {
    id: TaskId,
    name: String,
    exec: Executor,
    state: TaskState,
    turns: usize,
}

/// A task that left the scheduler
#[derive(Debug)]
pub struct Completion {
    /// The task
    pub id: TaskId,
    /// Name of the function the task was spawned with
    pub name: String,
    /// Return values, or the error that aborted the task
    pub result: Result<Vec<Value>, ExecError>,
    /// Number of turns (drains) the task took
    pub turns: usize,
}

/// Round-robin scheduler over independent executions
pub struct Scheduler {
    config: EngineConfig,
    queue: VecDeque<Task>,
    next_id: u64,
    turns: u64,
}

impl Scheduler {
    /// Create an empty scheduler; every task gets an executor built from `config`
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            next_id: 1,
            turns: 0,
        }
    }

    /// Queue `function(args)` as a new task
    pub fn spawn(&mut self, function: FunctionRef, args: &[Value]) -> Result<TaskId, RuntimeError> {
        let mut exec = Executor::new(&self.config)?;
        let name = function.name().to_string();
        exec.push_call(function, args)?;

        let id = TaskId(self.next_id);
        self.next_id += 1;
        debug!(task = id.0, function = %name, "task spawned");
        self.queue.push_back(Task {
            id,
            name,
            exec,
            state: TaskState::Created,
            turns: 0,
        });
        Ok(id)
    }

    /// Number of tasks still queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if every task has left the scheduler
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of turns taken so far
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// State of a queued task, `None` once it has completed or been cancelled
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.queue.iter().find(|t| t.id == id).map(|t| t.state)
    }

    /// Queued task ids in turn order
    pub fn pending(&self) -> Vec<TaskId> {
        self.queue.iter().map(|t| t.id).collect()
    }

    /// Drop a task along with its suspended call stack
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.queue.iter().position(|t| t.id == id) {
            Some(index) => {
                self.queue.remove(index);
                debug!(task = id.0, "task cancelled");
                true
            }
            None => false,
        }
    }

    /// Give one turn to the task at the front of the queue.
    ///
    /// Returns the task if it finished or failed during this turn.
    pub fn step(&mut self) -> Option<Completion> {
        let mut task = self.queue.pop_front()?;
        self.turns += 1;
        task.turns += 1;
        trace!(task = task.id.0, turn = task.turns, "task turn");

        match task.exec.drain() {
            Ok(Drain::Paused) => {
                let reason = task
                    .exec
                    .last_suspend_reason()
                    .unwrap_or(SuspendReason::Preempted);
                task.state = TaskState::Suspended(reason);
                self.queue.push_back(task);
                None
            }
            Ok(Drain::Finished) => {
                debug!(task = task.id.0, turns = task.turns, "task finished");
                let results = task.exec.take_results();
                Some(Completion {
                    id: task.id,
                    name: task.name,
                    result: Ok(results),
                    turns: task.turns,
                })
            }
            Err(e) => {
                warn!(task = task.id.0, error = %e, "task failed");
                Some(Completion {
                    id: task.id,
                    name: task.name,
                    result: Err(e),
                    turns: task.turns,
                })
            }
        }
    }

    /// Run until the queue is empty; completions come back in the order tasks finished
    pub fn run(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while !self.is_empty() {
            if let Some(completion) = self.step() {
                done.push(completion);
            }
        }
        done
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("turns", &self.turns)
            .finish()
    }
}
