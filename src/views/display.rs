use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::render::burn;
use crate::state::{CounterState, CounterStore, Subscription};

use super::{View, ViewCell, select_state};

/// Leaf view: shows the count after a deliberately expensive render.
pub struct DisplayCount {
    index: usize,
    cost: Duration,
    cell: Rc<ViewCell>,
    _subscription: Subscription,
}

impl DisplayCount {
    pub fn mount(index: usize, store: &CounterStore, cost: Duration) -> Self {
        let cell = Rc::new(ViewCell::default());
        let marker = Rc::clone(&cell);
        let subscription = store.subscribe(select_state, move |_| marker.invalidate());
        Self {
            index,
            cost,
            cell,
            _subscription: subscription,
        }
    }
}

impl View for DisplayCount {
    fn id(&self) -> &str {
        super::ids::DISPLAY
    }

    fn cell(&self) -> &ViewCell {
        &self.cell
    }

    fn render(&self, state: &CounterState) -> i64 {
        let count = state.count;
        burn(self.cost);
        trace!(view = self.id(), index = self.index, count, "rendered");
        count
    }
}
