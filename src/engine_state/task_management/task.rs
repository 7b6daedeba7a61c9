//! # Task System Core Types
//!
//! This module defines the building blocks the [`TaskManager`](super::TaskManager) queues
//! and runs.
//!
//! ## Core Components
//! - `TaskRunner`: the body of a unit of work, invoked once with a [`Done`] guard
//! - `Task`: a runner plus the tags used to find, debounce and flush it
//! - `TaskHandle`: a cheap observer used to inspect or cancel a queued task
//! - `Done`: the completion guard that releases the scheduler lock
//! - `Lane`: the priority queue a task waits in
//!
//! ## Task Lifecycle
//! 1. A task is created by `TaskManager::add()` and waits in its lane (`Pending`)
//! 2. `TaskManager::tick()` pops it, locks the scheduler and calls `Task::run()`
//! 3. The runner executes (`Running`) and the task ends `Completed`
//! 4. A task canceled while pending ends `Canceled` and its runner never executes
//!
//! ## Completion Contract
//! Every runner receives a [`Done`] guard. Releasing it, explicitly with
//! [`Done::finish`] or implicitly by dropping it on any exit path, unlocks the scheduler.
//! A runner may hold on to the guard to keep the scheduler locked until some later point,
//! but it cannot forget to release it: the guard's `Drop` does that.

use std::{
    cell::Cell,
    fmt,
    rc::Rc,
};

/// The scheduler's priority lanes, in the order `tick()` drains them.
///
/// Each lane keeps insertion order and draws according to its own [`DrawPolicy`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Work that must happen before anything else queued (FIFO).
    Pre,
    /// High priority, newest request first (LIFO). World generation runs here.
    Normal,
    /// Low priority, oldest request first (FIFO). Chunk buffer syncs run here.
    Reversed,
    /// Follow-up work that should trail generation (FIFO). Lighting runs here.
    Post,
    /// Best-effort work drawn in an unspecified order.
    Random,
}

/// How a lane chooses its next task.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DrawPolicy {
    /// Oldest queued task first.
    Fifo,
    /// Newest queued task first.
    Lifo,
    /// Any queued task, chosen with the scheduler's seeded generator.
    Random,
}

impl Lane {
    /// Number of lanes.
    pub const COUNT: usize = 5;

    /// All lanes in priority order.
    pub fn all() -> [Lane; Lane::COUNT] {
        [Lane::Pre, Lane::Normal, Lane::Reversed, Lane::Post, Lane::Random]
    }

    /// The draw policy this lane applies when the scheduler takes from it.
    pub fn draw_policy(self) -> DrawPolicy {
        match self {
            Lane::Pre | Lane::Reversed | Lane::Post => DrawPolicy::Fifo,
            Lane::Normal => DrawPolicy::Lifo,
            Lane::Random => DrawPolicy::Random,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Where a task is in its life.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Queued and waiting for a tick.
    Pending,
    /// Its runner is executing.
    Running,
    /// Its runner executed.
    Completed,
    /// It was canceled before its runner executed.
    Canceled,
}

/// Guard handed to every runner; releasing it unlocks the scheduler.
///
/// The lock is released exactly once, either by [`Done::finish`] or when the guard is
/// dropped, so early returns and panics unwinding through a runner cannot deadlock the
/// scheduler.
#[must_use = "dropping the guard immediately releases the scheduler lock"]
pub struct Done {
    lock: Rc<Cell<bool>>,
}

impl Done {
    pub(crate) fn acquire(lock: Rc<Cell<bool>>) -> Self {
        lock.set(true);
        Done { lock }
    }

    /// Releases the scheduler lock.
    pub fn finish(self) {
        // Drop does the release.
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        self.lock.set(false);
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").field("locked", &self.lock.get()).finish()
    }
}

/// The body of a task.
///
/// Runners own everything they touch (usually [`StResource`](crate::core::StResource)
/// clones of the systems they mutate) and are consumed when they run. Closures taking a
/// [`Done`] implement this trait, so ad-hoc work can be queued without a dedicated type.
pub trait TaskRunner {
    /// Performs the work. The scheduler stays locked until `done` is released.
    fn run(self: Box<Self>, done: Done);
}

impl<F> TaskRunner for F
where
    F: FnOnce(Done),
{
    fn run(self: Box<Self>, done: Done) {
        (*self)(done)
    }
}

/// A queued unit of work: a runner, its tags and its shared state.
pub struct Task {
    tags: Vec<String>,
    runner: Option<Box<dyn TaskRunner>>,
    state: Rc<Cell<TaskState>>,
}

impl Task {
    /// Wraps a runner with the tags used to match it later.
    pub fn new(runner: Box<dyn TaskRunner>, tags: Vec<String>) -> Self {
        Task {
            tags,
            runner: Some(runner),
            state: Rc::new(Cell::new(TaskState::Pending)),
        }
    }

    /// The tags this task was queued with.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Current state of the task.
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// A handle observing this task.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            state: self.state.clone(),
        }
    }

    /// Returns `true` if this task's tags contain every query tag.
    ///
    /// An empty query matches every task.
    pub fn matches<S: AsRef<str>>(&self, query: &[S]) -> bool {
        query
            .iter()
            .all(|wanted| self.tags.iter().any(|tag| tag == wanted.as_ref()))
    }

    /// Marks the task so its runner is skipped when it is popped.
    pub fn cancel(&self) {
        if self.state.get() == TaskState::Pending {
            self.state.set(TaskState::Canceled);
        }
    }

    /// Runs the task, consuming it.
    ///
    /// A canceled or already completed task releases `done` immediately without touching
    /// its runner.
    pub fn run(mut self, done: Done) {
        let runner = match (self.state.get(), self.runner.take()) {
            (TaskState::Pending, Some(runner)) => runner,
            _ => {
                done.finish();
                return;
            }
        };

        self.state.set(TaskState::Running);
        runner.run(done);
        self.state.set(TaskState::Completed);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("tags", &self.tags)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Observer for a task returned by `TaskManager::add()`.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    state: Rc<Cell<TaskState>>,
}

impl TaskHandle {
    /// Current state of the observed task.
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Cancels the task if it has not started yet. The task stays queued and is
    /// short-circuited when popped.
    pub fn cancel(&self) {
        if self.state.get() == TaskState::Pending {
            self.state.set(TaskState::Canceled);
        }
    }

    /// Returns `true` once the task can no longer run.
    pub fn is_finished(&self) -> bool {
        matches!(self.state.get(), TaskState::Completed | TaskState::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|tag| tag.to_string()).collect()
    }

    #[test]
    fn done_releases_lock_on_drop() {
        let lock = Rc::new(Cell::new(false));
        {
            let _done = Done::acquire(lock.clone());
            assert!(lock.get());
        }
        assert!(!lock.get());

        Done::acquire(lock.clone()).finish();
        assert!(!lock.get());
    }

    #[test]
    fn matching_is_superset_based() {
        let task = Task::new(Box::new(|_done: Done| {}), tags(&["world", "generate", "0_0"]));

        assert!(task.matches(&["world"]));
        assert!(task.matches(&["generate", "0_0"]));
        assert!(task.matches::<&str>(&[]));
        assert!(!task.matches(&["world", "1_0"]));
    }

    #[test]
    fn canceled_task_skips_runner_and_releases_lock() {
        let lock = Rc::new(Cell::new(false));
        let ran = Rc::new(Cell::new(false));
        let ran_in_task = ran.clone();
        let task = Task::new(
            Box::new(move |_done: Done| ran_in_task.set(true)),
            tags(&["a"]),
        );
        let handle = task.handle();

        handle.cancel();
        task.run(Done::acquire(lock.clone()));

        assert!(!ran.get());
        assert!(!lock.get());
        assert_eq!(handle.state(), TaskState::Canceled);
    }

    #[test]
    fn runner_that_returns_early_still_unlocks() {
        let lock = Rc::new(Cell::new(false));
        let task = Task::new(
            Box::new(|done: Done| {
                if true {
                    return;
                }
                done.finish();
            }),
            tags(&["early"]),
        );
        let handle = task.handle();

        task.run(Done::acquire(lock.clone()));

        assert!(!lock.get());
        assert_eq!(handle.state(), TaskState::Completed);
    }

    #[test]
    fn cancel_after_completion_is_ignored() {
        let lock = Rc::new(Cell::new(false));
        let task = Task::new(Box::new(|_done: Done| {}), tags(&["a"]));
        let handle = task.handle();
        task.run(Done::acquire(lock));

        handle.cancel();

        assert_eq!(handle.state(), TaskState::Completed);
        assert!(handle.is_finished());
    }

    #[test]
    fn lanes_have_expected_policies() {
        assert_eq!(Lane::Normal.draw_policy(), DrawPolicy::Lifo);
        assert_eq!(Lane::Reversed.draw_policy(), DrawPolicy::Fifo);
        assert_eq!(Lane::Random.draw_policy(), DrawPolicy::Random);
        assert_eq!(Lane::all().len(), Lane::COUNT);
        for (position, lane) in Lane::all().iter().enumerate() {
            assert_eq!(lane.index(), position);
        }
    }
}
