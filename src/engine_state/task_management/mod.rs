//! # Task Management System
//!
//! A cooperative, single-flight task scheduler. Every mutation of the world (generation,
//! lighting, chunk buffer syncs) is queued here and executed one task at a time on the
//! thread that drives the engine.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: a cheap, cloneable handle to the lanes and the global lock
//! - `Task` / `TaskRunner`: a unit of work and its body (see [`task`])
//! - `Done`: the guard that releases the lock when a runner finishes
//! - `TickDriver`: converts elapsed time into ticks at a fixed rate (see [`driver`])
//!
//! ## Scheduling Model
//!
//! There is no parallelism and no timer. The host calls `tick()` once per frame (or once per
//! fixed-rate driver step). If the scheduler is started and not locked, `tick()` scans the
//! lanes in priority order, takes the first non-empty lane's next task according to that
//! lane's draw policy, locks, and runs it to completion synchronously. The lock stays set
//! until the runner's `Done` guard is released, so at most one task is ever in flight.
//!
//! Because exactly one runner executes at a time, the systems the runners mutate need no
//! locking of their own.
//!
//! ## Tags
//!
//! Tasks carry string tags (for example `["world", "generate", "3_-2"]`). A query matches a
//! task when the task's tags contain every query tag. Tags drive two operations:
//! - **debounce**: `add(.., replace = true)` swaps out a queued task in the same lane that
//!   matches the new tags instead of queueing a duplicate
//! - **flush**: `flush(tags)` drops every queued task matching `tags` from every lane
//!
//! ## Example Usage
//! ```rust
//! use voxel_world_engine::engine_state::task_management::{TaskManager, task::{Done, Lane}};
//!
//! let task_manager = TaskManager::new(7);
//! task_manager.start();
//!
//! task_manager.add(|done: Done| done.finish(), &["chunk", "0_0"], Lane::Reversed, true);
//!
//! // In the host loop:
//! task_manager.tick();
//! assert!(task_manager.is_empty());
//! ```

pub mod driver;
pub mod task;

use log::{debug, trace};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};
use task::{Done, DrawPolicy, Lane, Task, TaskHandle, TaskRunner};

/// The queued tasks of every lane plus the generator used by the random lane.
struct Lanes {
    queues: [VecDeque<Task>; Lane::COUNT],
    rng: fastrand::Rng,
}

impl Lanes {
    fn take_next(&mut self, lane: Lane) -> Option<Task> {
        let queue = &mut self.queues[lane.index()];
        match lane.draw_policy() {
            DrawPolicy::Fifo => queue.pop_front(),
            DrawPolicy::Lifo => queue.pop_back(),
            DrawPolicy::Random => {
                if queue.is_empty() {
                    None
                } else {
                    let index = self.rng.usize(..queue.len());
                    queue.swap_remove_back(index)
                }
            }
        }
    }
}

/// Cooperative single-flight scheduler with priority lanes.
///
/// Cloning a `TaskManager` yields another handle to the same queues and lock, which is how
/// runners queue follow-up work while they execute.
#[derive(Clone)]
pub struct TaskManager {
    lanes: Rc<RefCell<Lanes>>,
    lock: Rc<Cell<bool>>,
    running: Rc<Cell<bool>>,
}

impl TaskManager {
    /// Creates a stopped scheduler. `seed` drives the random lane's draw order.
    pub fn new(seed: u64) -> Self {
        TaskManager {
            lanes: Rc::new(RefCell::new(Lanes {
                queues: Default::default(),
                rng: fastrand::Rng::with_seed(seed),
            })),
            lock: Rc::new(Cell::new(false)),
            running: Rc::new(Cell::new(false)),
        }
    }

    /// Queues `runner` in `lane` under `tags`.
    ///
    /// With `replace_if_tag_match`, a pending task in the same lane whose tags contain all of
    /// `tags` is replaced in place (and reported canceled to its observers); the new task
    /// takes its queue position. Otherwise the task is appended to the lane.
    pub fn add<R, S>(
        &self,
        runner: R,
        tags: &[S],
        lane: Lane,
        replace_if_tag_match: bool,
    ) -> TaskHandle
    where
        R: TaskRunner + 'static,
        S: AsRef<str>,
    {
        let tags: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_owned()).collect();
        let task = Task::new(Box::new(runner), tags);
        let handle = task.handle();

        let mut lanes = self.lanes.borrow_mut();
        let queue = &mut lanes.queues[lane.index()];

        if replace_if_tag_match {
            if let Some(existing) = queue.iter_mut().find(|queued| queued.matches(task.tags())) {
                debug!("Replacing queued task {:?} in {:?}", existing.tags(), lane);
                existing.cancel();
                *existing = task;
                return handle;
            }
        }

        trace!("Queueing task {:?} in {:?}", task.tags(), lane);
        queue.push_back(task);
        handle
    }

    /// Runs the next task if the scheduler is started and idle.
    ///
    /// Returns `true` if a task was taken from a lane. A canceled task still counts: it is
    /// popped and short-circuited, consuming the tick.
    pub fn tick(&self) -> bool {
        if !self.running.get() {
            return false;
        }
        if self.lock.get() {
            trace!("Task manager is locked");
            return false;
        }

        let next = {
            let mut lanes = self.lanes.borrow_mut();
            Lane::all().into_iter().find_map(|lane| lanes.take_next(lane))
        };

        match next {
            Some(task) => {
                trace!("Running task {:?}", task.tags());
                task.run(Done::acquire(self.lock.clone()));
                true
            }
            None => false,
        }
    }

    /// Ticks until every lane is empty and the lock is free, or `max_ticks` ticks were
    /// attempted. Returns the number of tasks taken.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut taken = 0;
        for _ in 0..max_ticks {
            if self.is_empty() && !self.is_locked() {
                break;
            }
            if self.tick() {
                taken += 1;
            } else if !self.running.get() || self.is_locked() {
                break;
            }
        }
        taken
    }

    /// Removes every queued task matching `tags` from every lane and marks it canceled.
    /// Returns the number of tasks removed. An empty query flushes everything.
    pub fn flush<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let mut lanes = self.lanes.borrow_mut();
        let mut removed = 0;
        for queue in lanes.queues.iter_mut() {
            queue.retain(|task| {
                if task.matches(tags) {
                    task.cancel();
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        if removed > 0 {
            debug!(
                "Flushed {} task(s) matching {:?}",
                removed,
                tags.iter().map(AsRef::as_ref).collect::<Vec<_>>()
            );
        }
        removed
    }

    /// Lets `tick()` take effect.
    pub fn start(&self) {
        self.running.set(true);
    }

    /// Makes `tick()` a no-op. Queued tasks stay queued.
    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Whether `tick()` currently has effect.
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Whether a task's `Done` guard is still outstanding.
    pub fn is_locked(&self) -> bool {
        self.lock.get()
    }

    /// Number of tasks queued across all lanes.
    pub fn len(&self) -> usize {
        self.lanes.borrow().queues.iter().map(VecDeque::len).sum()
    }

    /// Returns `true` if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks queued in `lane`.
    pub fn queued_in(&self, lane: Lane) -> usize {
        self.lanes.borrow().queues[lane.index()].len()
    }

    /// Number of queued tasks, in any lane, matching `tags`.
    pub fn count_matching<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        self.lanes
            .borrow()
            .queues
            .iter()
            .flat_map(|queue| queue.iter())
            .filter(|task| task.matches(tags))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::task::TaskState;
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce(Done)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| {
            let sink = sink.clone();
            Box::new(move |_done: Done| sink.borrow_mut().push(name)) as Box<dyn FnOnce(Done)>
        };
        (log, make)
    }

    fn started(seed: u64) -> TaskManager {
        let task_manager = TaskManager::new(seed);
        task_manager.start();
        task_manager
    }

    #[test]
    fn replace_collapses_duplicate_requests() {
        let task_manager = started(1);
        let (log, make) = recorder();

        let first = task_manager.add(make("first"), &["chunk", "A"], Lane::Normal, true);
        let second = task_manager.add(make("second"), &["chunk", "A"], Lane::Normal, true);

        assert_eq!(task_manager.count_matching(&["chunk", "A"]), 1);
        assert_eq!(first.state(), TaskState::Canceled);

        task_manager.run_until_idle(10);

        assert_eq!(*log.borrow(), vec!["second"]);
        assert_eq!(second.state(), TaskState::Completed);
    }

    #[test]
    fn replace_only_looks_in_the_same_lane() {
        let task_manager = started(1);
        let (_log, make) = recorder();

        task_manager.add(make("a"), &["chunk", "A"], Lane::Normal, true);
        task_manager.add(make("b"), &["chunk", "A"], Lane::Post, true);

        assert_eq!(task_manager.count_matching(&["chunk", "A"]), 2);
    }

    #[test]
    fn without_replace_duplicates_are_queued() {
        let task_manager = started(1);
        let (log, make) = recorder();

        task_manager.add(make("one"), &["shading", "A"], Lane::Post, false);
        task_manager.add(make("two"), &["shading", "A"], Lane::Post, false);
        task_manager.run_until_idle(10);

        assert_eq!(*log.borrow(), vec!["one", "two"]);
    }

    #[test]
    fn one_tick_runs_exactly_one_task() {
        let task_manager = started(1);
        let (_log, make) = recorder();

        let a = task_manager.add(make("a"), &["a"], Lane::Reversed, false);
        let b = task_manager.add(make("b"), &["b"], Lane::Reversed, false);

        assert!(task_manager.tick());

        assert_eq!(a.state(), TaskState::Completed);
        assert_eq!(b.state(), TaskState::Pending);
        assert_eq!(task_manager.len(), 1);
    }

    #[test]
    fn held_guard_blocks_further_ticks() {
        let task_manager = started(1);
        let parked: Rc<RefCell<Option<Done>>> = Rc::new(RefCell::new(None));
        let slot = parked.clone();
        let (log, make) = recorder();

        task_manager.add(
            move |done: Done| {
                *slot.borrow_mut() = Some(done);
            },
            &["slow"],
            Lane::Pre,
            false,
        );
        task_manager.add(make("next"), &["next"], Lane::Pre, false);

        assert!(task_manager.tick());
        assert!(task_manager.is_locked());
        assert!(!task_manager.tick());
        assert!(log.borrow().is_empty());

        parked.borrow_mut().take().unwrap().finish();
        assert!(!task_manager.is_locked());
        assert!(task_manager.tick());
        assert_eq!(*log.borrow(), vec!["next"]);
    }

    #[test]
    fn lanes_drain_in_priority_order_with_their_policies() {
        let task_manager = started(1);
        let (log, make) = recorder();

        task_manager.add(make("post"), &["post"], Lane::Post, false);
        task_manager.add(make("reversed-1"), &["r1"], Lane::Reversed, false);
        task_manager.add(make("reversed-2"), &["r2"], Lane::Reversed, false);
        task_manager.add(make("normal-1"), &["n1"], Lane::Normal, false);
        task_manager.add(make("normal-2"), &["n2"], Lane::Normal, false);
        task_manager.add(make("pre"), &["pre"], Lane::Pre, false);

        task_manager.run_until_idle(20);

        assert_eq!(
            *log.borrow(),
            vec!["pre", "normal-2", "normal-1", "reversed-1", "reversed-2", "post"]
        );
    }

    #[test]
    fn random_lane_runs_everything_once() {
        let task_manager = started(99);
        let (log, make) = recorder();
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            task_manager.add(make(name), &[name], Lane::Random, false);
        }

        task_manager.run_until_idle(20);

        let mut ran = log.borrow().clone();
        ran.sort_unstable();
        assert_eq!(ran, names.to_vec());
    }

    #[test]
    fn flush_removes_only_matching_tasks_from_every_lane() {
        let task_manager = started(1);
        let (log, make) = recorder();

        let a_generate = task_manager.add(make("a-gen"), &["world", "chunk", "A"], Lane::Normal, false);
        task_manager.add(make("a-sync"), &["chunk", "A"], Lane::Reversed, false);
        task_manager.add(make("b-sync"), &["chunk", "B"], Lane::Reversed, false);

        assert_eq!(task_manager.flush(&["chunk", "A"]), 2);

        assert_eq!(task_manager.count_matching(&["chunk", "A"]), 0);
        assert_eq!(task_manager.count_matching(&["chunk", "B"]), 1);
        assert_eq!(a_generate.state(), TaskState::Canceled);

        task_manager.run_until_idle(10);
        assert_eq!(*log.borrow(), vec!["b-sync"]);
    }

    #[test]
    fn cancel_leaves_task_queued_but_skips_it() {
        let task_manager = started(1);
        let (log, make) = recorder();

        let handle = task_manager.add(make("skipped"), &["x"], Lane::Pre, false);
        handle.cancel();
        assert_eq!(task_manager.len(), 1);

        assert!(task_manager.tick());
        assert!(log.borrow().is_empty());
        assert!(!task_manager.is_locked());
        assert!(task_manager.is_empty());
    }

    #[test]
    fn stopped_manager_does_not_tick() {
        let task_manager = TaskManager::new(1);
        let (log, make) = recorder();
        task_manager.add(make("a"), &["a"], Lane::Pre, false);

        assert!(!task_manager.tick());
        task_manager.start();
        assert!(task_manager.tick());
        task_manager.stop();
        assert!(!task_manager.is_running());
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn runners_can_queue_follow_up_work() {
        let task_manager = started(1);
        let (log, make) = recorder();
        let inner = task_manager.clone();
        let follow_up = make("follow-up");

        task_manager.add(
            move |done: Done| {
                inner.add(follow_up, &["follow"], Lane::Post, false);
                done.finish();
            },
            &["first"],
            Lane::Normal,
            false,
        );

        assert_eq!(task_manager.run_until_idle(10), 2);
        assert_eq!(*log.borrow(), vec!["follow-up"]);
    }
}
