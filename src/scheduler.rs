//! Render passes over the view tree.
//!
//! A pass renders every dirty view and commits the results as one [`Frame`].
//! Passes on the [`Lane::Transition`] lane yield to input between views, so
//! the store can move while a pass is half done. What happens then depends
//! on the [`CommitPolicy`]:
//!
//! - `Revalidate` renders every view from the snapshot taken at the start of
//!   the pass and throws the pass away if the store has moved on by the time
//!   it would commit. Frames are never torn.
//! - `Naive` lets each view read the live store when its turn comes and
//!   commits whatever came out. Views rendered before and after a mid-pass
//!   mutation then disagree on screen.
//!
//! `Sync` passes never yield, so nothing can interleave with them. After
//! `max_restarts` consecutive discarded passes the next one runs as `Sync`
//! so a steady stream of input cannot starve rendering.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::input::{Button, Closed, InputSource};
use crate::render::Frame;
use crate::settings::DemoSettings;
use crate::state::{CounterStore, Snapshot};
use crate::views::app::App;
use crate::views::display::DisplayCount;
use crate::views::{View, select_state};

/// Render priority. `Sync` outranks `Transition`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lane {
    Transition,
    Sync,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommitPolicy {
    #[default]
    Revalidate,
    Naive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub passes: u64,
    pub commits: u64,
    pub discarded: u64,
    pub torn_frames: u64,
    pub sync_fallbacks: u64,
}

pub struct Scheduler {
    store: CounterStore,
    app: App,
    leaves: Vec<DisplayCount>,
    policy: CommitPolicy,
    max_restarts: u32,
    pending: Option<Lane>,
    mounted: bool,
    restarts: u32,
    frames: Vec<Frame>,
    stats: Stats,
}

impl Scheduler {
    /// Mount the root view and `leaf_count` leaves against `store`.
    ///
    /// Nothing is rendered yet; see [`Scheduler::mount`].
    pub fn new(store: &CounterStore, settings: &DemoSettings) -> Self {
        let app = App::mount(store, settings.defer_increment);
        let leaves = (0..settings.leaf_count)
            .map(|i| DisplayCount::mount(i, store, settings.render_cost))
            .collect();

        Self {
            store: store.clone(),
            app,
            leaves,
            policy: settings.policy,
            max_restarts: settings.max_restarts,
            pending: None,
            mounted: false,
            restarts: 0,
            frames: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Render and commit the first frame on the `Sync` lane without looking
    /// at input. Does nothing once mounted.
    ///
    /// Call this before starting anything that produces presses on a clock,
    /// otherwise the presses pile up behind the (slow, non-yielding) mount.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        self.perform(Lane::Sync, &mut Closed);
        info!(views = self.unit_count(), "mounted");
    }

    /// Process input and render until `input` is exhausted and no work is
    /// left. Mounts first if [`Scheduler::mount`] has not run.
    pub fn run(&mut self, input: &mut dyn InputSource) {
        self.mount();
        loop {
            self.drain(input);
            if let Some(lane) = self.pending.take() {
                self.perform(lane, input);
                continue;
            }
            match input.wait() {
                Some(button) => self.dispatch(button),
                None => break,
            }
        }
        info!(frames = self.frames.len(), "input closed, scheduler idle");
    }

    fn dispatch(&mut self, button: Button) {
        let lane = self.app.press(button);
        self.raise(lane);
    }

    fn raise(&mut self, lane: Lane) {
        self.pending = Some(self.pending.map_or(lane, |p| p.max(lane)));
    }

    fn drain(&mut self, input: &mut dyn InputSource) {
        while let Some(button) = input.poll() {
            self.dispatch(button);
        }
    }

    fn perform(&mut self, lane: Lane, input: &mut dyn InputSource) {
        let lane = if lane == Lane::Transition && self.restarts >= self.max_restarts {
            debug!(restarts = self.restarts, "too many restarts, rendering on sync lane");
            self.stats.sync_fallbacks += 1;
            Lane::Sync
        } else {
            lane
        };

        self.stats.passes += 1;
        match self.policy {
            CommitPolicy::Revalidate => self.render_consistent(lane, input),
            CommitPolicy::Naive => self.render_live(lane, input),
        }
    }

    /// Unit 0 is the root view, units 1.. are the leaves.
    fn unit(&self, k: usize) -> &dyn View {
        match k {
            0 => &self.app as &dyn View,
            _ => &self.leaves[k - 1],
        }
    }

    fn unit_count(&self) -> usize {
        self.leaves.len() + 1
    }

    fn render_consistent(&mut self, lane: Lane, input: &mut dyn InputSource) {
        let snapshot = self.store.get_snapshot();
        let targets: Vec<usize> = (0..self.unit_count())
            .filter(|&k| self.unit(k).cell().is_dirty())
            .collect();

        let mut rendered = Vec::with_capacity(targets.len());
        for &k in &targets {
            rendered.push(self.unit(k).render(snapshot.state()));
            if lane == Lane::Transition {
                self.drain(input);
                if self.store.is_stale(&snapshot) {
                    self.discard(lane, &snapshot, rendered.len());
                    return;
                }
            }
        }

        if self.store.is_stale(&snapshot) {
            self.discard(lane, &snapshot, rendered.len());
            return;
        }

        for (&k, &value) in targets.iter().zip(&rendered) {
            let cell = self.unit(k).cell();
            cell.commit(value);
            cell.mark_clean();
        }
        self.commit_frame(lane, snapshot.version(), snapshot.version());
    }

    fn render_live(&mut self, lane: Lane, input: &mut dyn InputSource) {
        let mut rendered = Vec::new();
        let mut read: Option<(u64, u64)> = None;
        for k in 0..self.unit_count() {
            let view = self.unit(k);
            if !view.cell().is_dirty() {
                continue;
            }
            // Cleared before reading so a mutation during the render marks it
            // dirty again for the next pass.
            view.cell().mark_clean();
            let snapshot = self.store.get_snapshot();
            let state = select_state(snapshot.state());
            rendered.push((k, view.render(&state)));
            let v = snapshot.version();
            read = Some(read.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))));

            if lane == Lane::Transition {
                self.drain(input);
            }
        }

        for (k, value) in rendered {
            self.unit(k).cell().commit(value);
        }
        let current = self.store.version();
        let (oldest, newest) = read.unwrap_or((current, current));
        self.commit_frame(lane, oldest, newest);
    }

    fn discard(&mut self, lane: Lane, snapshot: &Snapshot, units_done: usize) {
        self.stats.discarded += 1;
        self.restarts += 1;
        self.raise(lane);
        debug!(
            version = snapshot.version(),
            current = self.store.version(),
            units_done,
            "discarded stale pass"
        );
    }

    fn commit_frame(&mut self, lane: Lane, oldest: u64, version: u64) {
        self.restarts = 0;
        let frame = Frame {
            oldest,
            version,
            lane,
            header: self.app.cell().committed(),
            cells: self.leaves.iter().map(|l| l.cell().committed()).collect(),
        };

        self.stats.commits += 1;
        if frame.is_torn() {
            self.stats.torn_frames += 1;
            warn!(oldest, version, ?lane, header = frame.header, "committed torn frame");
        } else {
            info!(version, ?lane, count = frame.header, "committed");
        }
        self.frames.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::input::{ScriptedPress, Steps, spawn_script};

    const INC: Option<Button> = Some(Button::Increment);
    const DEC: Option<Button> = Some(Button::Decrement);
    const IDLE: Option<Button> = None;

    fn settings(leaf_count: usize, policy: CommitPolicy) -> DemoSettings {
        DemoSettings {
            leaf_count,
            render_cost: Duration::ZERO,
            policy,
            ..DemoSettings::default()
        }
    }

    /// Increment on the transition lane, then a decrement that lands after
    /// the header and eleven leaves have rendered.
    fn interleaved_script() -> Steps {
        let mut steps = vec![IDLE, INC, IDLE];
        steps.extend([IDLE; 11]);
        steps.extend([DEC, IDLE]);
        Steps::new(steps)
    }

    fn all_equal(frame: &Frame, value: i64) -> bool {
        frame.header == value && frame.cells.iter().all(|&c| c == value)
    }

    #[test]
    fn mount_commits_initial_frame() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(50, CommitPolicy::Revalidate));
        scheduler.run(&mut Steps::new([IDLE; 0]));

        let frames = scheduler.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].lane, Lane::Sync);
        assert_eq!(frames[0].cells.len(), 50);
        assert!(all_equal(&frames[0], 0));
    }

    #[test]
    fn mount_does_not_consume_input() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(5, CommitPolicy::Revalidate));
        let mut steps = Steps::new([INC]);

        scheduler.mount();
        scheduler.mount();
        assert_eq!(scheduler.frames().len(), 1);
        assert!(all_equal(&scheduler.frames()[0], 0));
        assert_eq!(steps.remaining(), 1);

        scheduler.run(&mut steps);
        assert_eq!(scheduler.frames().len(), 2);
        assert_eq!(scheduler.frames()[1].lane, Lane::Transition);
        assert_eq!(scheduler.stats().passes, 2);
    }

    /// Mount, then replay an increment and a decrement that lands while the
    /// increment's transition pass is still rendering.
    fn replay_timed(policy: CommitPolicy) -> Scheduler {
        let store = CounterStore::new();
        let s = DemoSettings {
            leaf_count: 20,
            render_cost: Duration::from_millis(10),
            policy,
            script: vec![
                ScriptedPress { at_ms: 0, button: Button::Increment },
                ScriptedPress { at_ms: 80, button: Button::Decrement },
            ],
            ..DemoSettings::default()
        };
        let mut scheduler = Scheduler::new(&store, &s);
        scheduler.mount();

        let (tx, mut rx) = mpsc::channel();
        let feeder = spawn_script(s.script.clone(), tx);
        scheduler.run(&mut rx);
        feeder.join().unwrap();
        assert_eq!(store.get_snapshot().count(), 0);
        scheduler
    }

    #[test]
    fn timed_script_tears_with_live_reads() {
        let scheduler = replay_timed(CommitPolicy::Naive);

        let torn = scheduler
            .frames()
            .iter()
            .find(|f| f.is_torn())
            .expect("a torn frame");
        assert_eq!(torn.lane, Lane::Transition);
        assert!(torn.oldest < torn.version);
        assert!(scheduler.stats().torn_frames >= 1);
        assert!(all_equal(scheduler.frames().last().unwrap(), 0));
    }

    #[test]
    fn timed_script_stays_consistent_with_revalidation() {
        let scheduler = replay_timed(CommitPolicy::Revalidate);

        let stats = scheduler.stats();
        assert!(stats.discarded >= 1);
        assert_eq!(stats.torn_frames, 0);
        assert!(scheduler.frames().iter().all(|f| !f.is_torn() && f.oldest == f.version));
        assert!(all_equal(scheduler.frames().last().unwrap(), 0));
    }

    #[test]
    fn fifty_leaves_agree_after_one_increase() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(50, CommitPolicy::Revalidate));
        scheduler.run(&mut Steps::new([IDLE, INC]));

        let last = scheduler.frames().last().unwrap();
        assert_eq!(last.lane, Lane::Transition);
        assert!(all_equal(last, 1));
        assert_eq!(scheduler.stats().torn_frames, 0);
    }

    #[test]
    fn revalidation_discards_interrupted_pass() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(50, CommitPolicy::Revalidate));
        scheduler.run(&mut interleaved_script());

        let frames = scheduler.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| !f.is_torn()));
        assert!(all_equal(&frames[1], 0));
        assert_eq!(frames[1].version, 2);
        assert_eq!(frames[1].oldest, 2);
        assert_eq!(frames[1].lane, Lane::Sync);

        let stats = scheduler.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.torn_frames, 0);
        assert_eq!(stats.passes, 3);
    }

    #[test]
    fn live_reads_tear_under_interleaving() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(50, CommitPolicy::Naive));
        scheduler.run(&mut interleaved_script());

        let frames = scheduler.frames();
        assert_eq!(frames.len(), 3);

        let torn = &frames[1];
        assert!(torn.is_torn());
        assert_eq!((torn.oldest, torn.version), (1, 2));
        assert_eq!(torn.header, 1);
        assert_eq!(torn.cells.iter().filter(|&&c| c == 1).count(), 11);
        assert_eq!(torn.cells.iter().filter(|&&c| c == 0).count(), 39);

        // The follow-up pass repairs the screen.
        assert!(all_equal(&frames[2], 0));
        assert_eq!(scheduler.stats().torn_frames, 1);
    }

    #[test]
    fn newer_increase_restarts_transition() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(50, CommitPolicy::Revalidate));
        let mut steps = vec![IDLE, INC, IDLE];
        steps.extend([IDLE; 5]);
        steps.extend([INC, IDLE]);
        scheduler.run(&mut Steps::new(steps));

        let last = scheduler.frames().last().unwrap();
        assert_eq!(last.lane, Lane::Transition);
        assert!(all_equal(last, 2));
        assert_eq!(scheduler.stats().discarded, 1);
        assert_eq!(scheduler.stats().sync_fallbacks, 0);
    }

    #[test]
    fn repeated_restarts_fall_back_to_sync() {
        let store = CounterStore::new();
        let mut s = settings(10, CommitPolicy::Revalidate);
        s.max_restarts = 1;
        let mut scheduler = Scheduler::new(&store, &s);
        let mut steps = Steps::new([IDLE, INC, IDLE, INC, IDLE, INC, IDLE]);
        scheduler.run(&mut steps);

        let last = scheduler.frames().last().unwrap();
        assert_eq!(last.lane, Lane::Sync);
        assert!(all_equal(last, 3));
        assert_eq!(scheduler.stats().discarded, 1);
        assert_eq!(scheduler.stats().sync_fallbacks, 1);
        assert_eq!(steps.remaining(), 0);
    }

    #[test]
    fn sync_lane_never_yields() {
        for policy in [CommitPolicy::Revalidate, CommitPolicy::Naive] {
            let store = CounterStore::new();
            let mut s = settings(20, policy);
            s.defer_increment = false;
            let mut scheduler = Scheduler::new(&store, &s);
            scheduler.run(&mut Steps::new([IDLE, INC, IDLE, DEC, IDLE]));

            let values: Vec<i64> = scheduler.frames().iter().map(|f| f.header).collect();
            assert_eq!(values, vec![0, 1, 0]);
            assert!(scheduler.frames().iter().all(|f| !f.is_torn()));
            assert!(scheduler.frames().iter().all(|f| f.lane == Lane::Sync));
        }
    }

    #[test]
    fn scenario_ends_at_minus_one() {
        let store = CounterStore::new();
        let mut scheduler = Scheduler::new(&store, &settings(5, CommitPolicy::Revalidate));
        scheduler.run(&mut Steps::new([IDLE, INC, IDLE, DEC, IDLE, DEC]));

        assert_eq!(store.get_snapshot().count(), -1);
        assert!(all_equal(scheduler.frames().last().unwrap(), -1));
    }

    #[test]
    fn stats_serialize_for_summary() {
        let stats = Stats { passes: 3, commits: 2, discarded: 1, torn_frames: 0, sync_fallbacks: 0 };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["discarded"], 1);
    }
}
