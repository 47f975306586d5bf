//! Component lifecycle state machine and the embedded cooperative scheduler.
//!
//! Every unit of firmware functionality — a sensor, an output, a protocol
//! client — is a *component*: a struct embedding a [`ComponentCore`] and
//! implementing the [`Component`] trait.  The framework drives each
//! component through a strict lifecycle and, once per loop iteration,
//! scans its private task list:
//!
//! ```text
//!  Construction ──setup_once()──▶ Setup ──loop_once()──▶ Loop ─┐
//!        │                          │                      ▲   │
//!        │                     mark_failed()          loop_once()
//!        │                          ▼                          │
//!        └────────────────────▶  Failed  ◀─────────────────────┘
//!                              (terminal)
//! ```
//!
//! Scheduling is cooperative and single-threaded: a callback runs to
//! completion before the scan moves on, and a callback that blocks stalls
//! the whole device.  Callbacks may freely add, cancel, or re-register
//! tasks on their own component mid-scan; the scan marks finished or
//! cancelled entries for removal and compacts the list in a single pass
//! afterwards, so no index into the task list is ever invalidated while
//! it is being walked.

use std::rc::Rc;

use log::{error, info, trace};

use crate::platform::Platform;

/// Name of the interval task auto-registered by polling cores.
pub const UPDATE_TASK: &str = "update";

// ───────────────────────────────────────────────────────────────
// Lifecycle state
// ───────────────────────────────────────────────────────────────

/// Lifecycle state of a component.
///
/// Transitions are strictly monotonic (`Construction → Setup → Loop`)
/// except for `Failed`, which is reachable from `Setup` or `Loop` at any
/// time and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Freshly constructed; the orchestrator has not called setup yet.
    Construction,
    /// One-time hardware initialisation has run (or is running).
    Setup,
    /// In the steady-state loop.
    Loop,
    /// Irrecoverable hardware failure; no further transitions occur.
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Scheduled tasks
// ───────────────────────────────────────────────────────────────

/// How a scheduled task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Recurring, re-armed after every firing with drift correction.
    Interval,
    /// One-shot after a delay, then discarded.
    Timeout,
    /// One-shot on the very next scan, regardless of elapsed time.
    Defer,
}

/// Callback owned by a task entry.  Receives the owning component so it
/// can read hardware state and reschedule on itself.
pub type TaskFn<C> = Box<dyn FnMut(&mut C)>;

struct Task<C> {
    /// Key for cancellation/dedup; `""` means unnamed (never deduplicated,
    /// not cancelable by name).
    name: String,
    kind: TaskKind,
    period_ms: u32,
    /// Timestamp (ms since boot, wraps) the due check is measured from.
    last_run_ms: u32,
    /// `None` only while the callback is executing.
    run: Option<TaskFn<C>>,
    /// Cancelled or completed; actual removal is deferred to the
    /// post-scan compaction so an in-progress scan never shifts indices.
    remove: bool,
}

impl<C> Task<C> {
    fn due(&self, now: u32) -> bool {
        if self.remove {
            return false;
        }
        match self.kind {
            TaskKind::Defer => true,
            TaskKind::Interval | TaskKind::Timeout => {
                now.wrapping_sub(self.last_run_ms) > self.period_ms
            }
        }
    }

    /// Re-arm an interval after it fired: advance `last_run_ms` by the
    /// largest whole multiple of the period that fits in the elapsed
    /// time.  A slow scan therefore causes one adjusted jump instead of
    /// a burst of catch-up firings.
    fn advance(&mut self, now: u32) {
        if self.period_ms == 0 {
            self.last_run_ms = now;
            return;
        }
        let elapsed = now.wrapping_sub(self.last_run_ms);
        let steps = elapsed / self.period_ms;
        self.last_run_ms = self.last_run_ms.wrapping_add(steps * self.period_ms);
    }
}

// ───────────────────────────────────────────────────────────────
// ComponentCore
// ───────────────────────────────────────────────────────────────

/// Lifecycle state plus the private task schedule of one component.
///
/// Embedded by value in every component struct; the type parameter is the
/// owning component itself, so task callbacks are plain
/// `FnMut(&mut TheComponent)` closures:
///
/// ```
/// use hearth::component::{Component, ComponentCore};
/// use hearth::platform::SimPlatform;
///
/// struct Heartbeat {
///     core: ComponentCore<Heartbeat>,
///     beats: u32,
/// }
///
/// impl Component for Heartbeat {
///     fn core(&self) -> &ComponentCore<Self> { &self.core }
///     fn core_mut(&mut self) -> &mut ComponentCore<Self> { &mut self.core }
///     fn setup(&mut self) {
///         self.set_interval("beat", 1000, |c| c.beats += 1);
///     }
/// }
///
/// let _ = Heartbeat { core: ComponentCore::new(SimPlatform::shared()), beats: 0 };
/// ```
pub struct ComponentCore<C> {
    state: ComponentState,
    /// Insertion order is execution order within a scan.
    tasks: Vec<Task<C>>,
    platform: Rc<dyn Platform>,
    /// `Some` marks a polling core: an `"update"` interval at this period
    /// is registered automatically at the end of setup.
    poll_interval_ms: Option<u32>,
}

impl<C> ComponentCore<C> {
    /// Core for an ordinary component (no automatic polling).
    pub fn new(platform: Rc<dyn Platform>) -> Self {
        Self {
            state: ComponentState::Construction,
            tasks: Vec::new(),
            platform,
            poll_interval_ms: None,
        }
    }

    /// Core for a polling component: after setup, the framework registers
    /// one named interval task (`"update"`) at `update_interval_ms` that
    /// invokes the component's [`Component::update`] hook.
    pub fn polling(platform: Rc<dyn Platform>, update_interval_ms: u32) -> Self {
        let mut core = Self::new(platform);
        core.poll_interval_ms = Some(update_interval_ms);
        core
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// The shared platform handle this core was constructed with.
    pub fn platform(&self) -> &Rc<dyn Platform> {
        &self.platform
    }

    /// Polling period, if this is a polling core.
    pub fn update_interval(&self) -> Option<u32> {
        self.poll_interval_ms
    }

    /// Number of live (not yet removed) scheduled tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.remove).count()
    }

    /// Transition to `Failed`.  Terminal: the component's schedule stops
    /// scanning and no later call moves the state elsewhere.
    pub fn mark_failed(&mut self) {
        error!("component marked as failed");
        self.state = ComponentState::Failed;
    }

    /// Schedule a recurring callback under `name`, cancelling any live
    /// interval with the same name first.
    ///
    /// The first firing is offset by a uniformly random jitter in
    /// `[0, period_ms)` so that the periodic work of many components
    /// created at boot does not collide on the same tick.  A period of 0
    /// is not rejected and fires on virtually every scan.
    pub fn set_interval(&mut self, name: &str, period_ms: u32, f: TaskFn<C>) {
        trace!("set_interval(name='{}', period={}ms)", name, period_ms);
        self.cancel(name, TaskKind::Interval);
        let now = self.platform.millis();
        let offset = if period_ms > 0 {
            self.platform.random_u32() % period_ms
        } else {
            0
        };
        self.tasks.push(Task {
            name: name.to_owned(),
            kind: TaskKind::Interval,
            period_ms,
            // Armed so the first due check passes at creation + offset.
            last_run_ms: now.wrapping_add(offset).wrapping_sub(period_ms),
            run: Some(f),
            remove: false,
        });
    }

    /// Cancel the live interval registered under `name`.  Returns whether
    /// one was found; always `false` for the empty name.
    pub fn cancel_interval(&mut self, name: &str) -> bool {
        self.cancel(name, TaskKind::Interval)
    }

    /// Schedule a one-shot callback `timeout_ms` from now (no jitter),
    /// cancelling any live timeout with the same name first.  Fires at
    /// most once, then the entry is removed.
    pub fn set_timeout(&mut self, name: &str, timeout_ms: u32, f: TaskFn<C>) {
        trace!("set_timeout(name='{}', timeout={}ms)", name, timeout_ms);
        self.cancel(name, TaskKind::Timeout);
        self.tasks.push(Task {
            name: name.to_owned(),
            kind: TaskKind::Timeout,
            period_ms: timeout_ms,
            last_run_ms: self.platform.millis(),
            run: Some(f),
            remove: false,
        });
    }

    pub fn cancel_timeout(&mut self, name: &str) -> bool {
        self.cancel(name, TaskKind::Timeout)
    }

    /// Schedule a callback that is unconditionally due: it runs on the
    /// very next scan, once, then is removed.  Used to break a call chain
    /// and continue on the next loop iteration instead of recursing.
    pub fn defer(&mut self, name: &str, f: TaskFn<C>) {
        trace!("defer(name='{}')", name);
        self.cancel(name, TaskKind::Defer);
        self.tasks.push(Task {
            name: name.to_owned(),
            kind: TaskKind::Defer,
            period_ms: 0,
            last_run_ms: self.platform.millis(),
            run: Some(f),
            remove: false,
        });
    }

    pub fn cancel_defer(&mut self, name: &str) -> bool {
        self.cancel(name, TaskKind::Defer)
    }

    fn cancel(&mut self, name: &str, kind: TaskKind) -> bool {
        if name.is_empty() {
            return false;
        }
        for task in &mut self.tasks {
            if !task.remove && task.kind == kind && task.name == name {
                trace!("cancelling task '{}'", task.name);
                task.remove = true;
                return true;
            }
        }
        false
    }

    /// Drop every entry marked for removal (stable, order-preserving).
    fn compact(&mut self) {
        self.tasks.retain(|t| !t.remove);
    }
}

impl<C: Component> ComponentCore<C> {
    /// Change the polling period.  If the `"update"` interval is already
    /// live it is re-armed at the new period immediately.
    pub fn set_update_interval(&mut self, update_interval_ms: u32) {
        self.poll_interval_ms = Some(update_interval_ms);
        let live = self
            .tasks
            .iter()
            .any(|t| !t.remove && t.kind == TaskKind::Interval && t.name == UPDATE_TASK);
        if live {
            self.set_interval(UPDATE_TASK, update_interval_ms, Box::new(C::update));
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Component trait (implemented per component variant)
// ───────────────────────────────────────────────────────────────

/// Named setup-priority tiers.  Higher runs earlier.
pub mod priority {
    /// Shared hardware buses (i2c and friends) before anything using them.
    pub const BUS: f32 = 60.0;
    /// Hardware drivers that other drivers depend on.
    pub const HARDWARE: f32 = 50.0;
    /// Hardware drivers with upstream dependencies.
    pub const HARDWARE_LATE: f32 = 40.0;
    /// Network stack and protocol clients.
    pub const NETWORK: f32 = 10.0;
    /// Everything else.
    pub const DEFAULT: f32 = 0.0;
}

/// A lifecycle-managed unit of firmware functionality.
///
/// Implementors embed a [`ComponentCore`] and wire up the two accessors;
/// everything else has a default.  Overridable hooks:
///
/// - [`setup`](Component::setup) — one-time hardware initialisation,
///   invoked exactly once by the framework.
/// - [`tick`](Component::tick) — custom per-iteration logic, invoked every
///   loop iteration after the scheduler scan.
/// - [`update`](Component::update) — invoked at the polling cadence for
///   components built with [`ComponentCore::polling`].
/// - [`setup_priority`](Component::setup_priority) /
///   [`loop_priority`](Component::loop_priority) — ordering hints
///   consumed by the orchestrator.
///
/// The scheduling methods are the only sanctioned way to do delayed or
/// periodic work: blocking (busy-waiting, sleeping) inside `setup`,
/// `tick`, `update`, or any scheduled callback stalls every component on
/// the device.
pub trait Component: 'static {
    fn core(&self) -> &ComponentCore<Self>
    where
        Self: Sized;

    fn core_mut(&mut self) -> &mut ComponentCore<Self>
    where
        Self: Sized;

    /// One-time hardware initialisation.  Signal an irrecoverable failure
    /// by calling [`mark_failed`](Component::mark_failed).
    fn setup(&mut self) {}

    /// Custom per-iteration logic, after the scheduler scan.
    fn tick(&mut self) {}

    /// Polling hook; only invoked for cores built with
    /// [`ComponentCore::polling`].
    fn update(&mut self) {}

    /// Setup ordering hint; higher runs earlier.  See [`priority`].
    fn setup_priority(&self) -> f32 {
        priority::DEFAULT
    }

    /// Loop ordering hint; higher runs earlier.
    fn loop_priority(&self) -> f32 {
        priority::DEFAULT
    }

    // ── Scheduling, delegated to the core ─────────────────────

    fn set_interval(&mut self, name: &str, period_ms: u32, f: impl FnMut(&mut Self) + 'static)
    where
        Self: Sized,
    {
        self.core_mut().set_interval(name, period_ms, Box::new(f));
    }

    fn cancel_interval(&mut self, name: &str) -> bool
    where
        Self: Sized,
    {
        self.core_mut().cancel_interval(name)
    }

    fn set_timeout(&mut self, name: &str, timeout_ms: u32, f: impl FnMut(&mut Self) + 'static)
    where
        Self: Sized,
    {
        self.core_mut().set_timeout(name, timeout_ms, Box::new(f));
    }

    fn cancel_timeout(&mut self, name: &str) -> bool
    where
        Self: Sized,
    {
        self.core_mut().cancel_timeout(name)
    }

    fn defer(&mut self, name: &str, f: impl FnMut(&mut Self) + 'static)
    where
        Self: Sized,
    {
        self.core_mut().defer(name, Box::new(f));
    }

    fn cancel_defer(&mut self, name: &str) -> bool
    where
        Self: Sized,
    {
        self.core_mut().cancel_defer(name)
    }

    /// Signal an irrecoverable runtime failure.  Local and non-fatal to
    /// the process: other components keep running.
    fn mark_failed(&mut self)
    where
        Self: Sized,
    {
        self.core_mut().mark_failed();
    }
}

// ───────────────────────────────────────────────────────────────
// Lifecycle trait (framework-facing, object safe)
// ───────────────────────────────────────────────────────────────

/// Object-safe lifecycle surface the orchestrator drives components
/// through.  Blanket-implemented for every [`Component`]; never
/// implemented by hand.
pub trait Lifecycle {
    /// Framework wrapper around setup.  Must be called exactly once, from
    /// `Construction`; a second call is a wiring defect and panics.
    fn setup_once(&mut self);

    /// Framework wrapper around one loop iteration: scheduler scan, then
    /// the component's own [`tick`](Component::tick).  No-op once the
    /// component has failed.
    fn loop_once(&mut self);

    fn state(&self) -> ComponentState;

    fn setup_priority(&self) -> f32;

    fn loop_priority(&self) -> f32;
}

impl<C: Component> Lifecycle for C {
    fn setup_once(&mut self) {
        let state = self.core().state();
        assert!(
            state == ComponentState::Construction,
            "setup_once called in state {state:?}; components are set up exactly once"
        );
        self.core_mut().state = ComponentState::Setup;
        self.setup();
        if self.core().state() == ComponentState::Failed {
            return;
        }
        if let Some(period) = self.core().poll_interval_ms {
            info!("update interval: {}ms", period);
            self.set_interval(UPDATE_TASK, period, C::update);
        }
    }

    fn loop_once(&mut self) {
        match self.core().state() {
            ComponentState::Construction => {
                panic!("loop_once called before setup_once");
            }
            ComponentState::Failed => return,
            ComponentState::Setup | ComponentState::Loop => {}
        }
        self.core_mut().state = ComponentState::Loop;
        run_pending(self);
        if self.core().state() == ComponentState::Failed {
            return;
        }
        self.tick();
    }

    fn state(&self) -> ComponentState {
        self.core().state()
    }

    fn setup_priority(&self) -> f32 {
        Component::setup_priority(self)
    }

    fn loop_priority(&self) -> f32 {
        Component::loop_priority(self)
    }
}

/// One scheduler scan: walk the task list left to right over its current
/// length, re-reading the length each step.  A callback may append tasks;
/// entries appended behind the cursor run within the same scan (accepted,
/// documented behaviour).  Removal only marks; compaction happens once
/// after the scan, so the cursor stays valid throughout.
fn run_pending<C: Component>(owner: &mut C) {
    let mut i = 0;
    while i < owner.core().tasks.len() {
        let now = owner.core().platform.millis();
        if owner.core().tasks[i].due(now) {
            // The callback gets `&mut C`, which includes the task list it
            // lives in, so it is taken out of its slot for the call.
            let mut cb = owner.core_mut().tasks[i].run.take();
            if let Some(f) = cb.as_mut() {
                f(owner);
            }
            let now = owner.core().platform.millis();
            let core = owner.core_mut();
            let task = &mut core.tasks[i];
            task.run = cb;
            match task.kind {
                TaskKind::Interval => task.advance(now),
                TaskKind::Timeout | TaskKind::Defer => task.remove = true,
            }
            if core.state == ComponentState::Failed {
                // Failure aborts the rest of this scan.
                core.compact();
                return;
            }
        }
        i += 1;
    }
    owner.core_mut().compact();
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
