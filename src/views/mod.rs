pub mod app;
pub mod display;

use std::cell::Cell;

use crate::state::CounterState;

pub mod ids {
    use crate::APP_ID;

    pub const APP: &str = const_format::concatcp!(APP_ID, ".app");
    pub const DISPLAY: &str = const_format::concatcp!(APP_ID, ".display");
}

/// Something the scheduler can render and commit.
pub trait View {
    fn id(&self) -> &str;

    fn cell(&self) -> &ViewCell;

    /// Produce this view's output for `state`. May be slow.
    fn render(&self, state: &CounterState) -> i64;
}

/// Per-view render bookkeeping, shared with the view's store subscription.
#[derive(Debug)]
pub struct ViewCell {
    dirty: Cell<bool>,
    committed: Cell<i64>,
}

impl Default for ViewCell {
    fn default() -> Self {
        // Not yet rendered, so the first pass must include it.
        Self {
            dirty: Cell::new(true),
            committed: Cell::new(0),
        }
    }
}

impl ViewCell {
    pub fn invalidate(&self) {
        self.dirty.set(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_clean(&self) {
        self.dirty.set(false);
    }

    pub fn commit(&self, value: i64) {
        self.committed.set(value);
    }

    pub fn committed(&self) -> i64 {
        self.committed.get()
    }
}

/// Identity selector: leaves and the header depend on the whole state.
pub fn select_state(state: &CounterState) -> CounterState {
    *state
}
