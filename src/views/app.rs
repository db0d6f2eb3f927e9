use std::rc::Rc;

use tracing::debug;

use crate::input::Button;
use crate::scheduler::Lane;
use crate::state::{CounterState, CounterStore, Subscription};

use super::{View, ViewCell, select_state};

/// Root view: the count header plus the two buttons that mutate the store.
pub struct App {
    store: CounterStore,
    defer_increment: bool,
    cell: Rc<ViewCell>,
    _subscription: Subscription,
}

impl App {
    pub fn mount(store: &CounterStore, defer_increment: bool) -> Self {
        let cell = Rc::new(ViewCell::default());
        let marker = Rc::clone(&cell);
        let subscription = store.subscribe(select_state, move |_| marker.invalidate());
        Self {
            store: store.clone(),
            defer_increment,
            cell,
            _subscription: subscription,
        }
    }

    /// Increment may be deferred; decrement is always urgent.
    pub fn lane_for(&self, button: Button) -> Lane {
        match button {
            Button::Increment if self.defer_increment => Lane::Transition,
            Button::Increment | Button::Decrement => Lane::Sync,
        }
    }

    /// Apply `button` to the store and return the lane its re-render runs on.
    pub fn press(&self, button: Button) -> Lane {
        let lane = self.lane_for(button);
        match button {
            Button::Increment => self.store.increase(),
            Button::Decrement => self.store.decrease(),
        }
        debug!(view = self.id(), ?button, ?lane, version = self.store.version(), "dispatched");
        lane
    }
}

impl View for App {
    fn id(&self) -> &str {
        super::ids::APP
    }

    fn cell(&self) -> &ViewCell {
        &self.cell
    }

    fn render(&self, state: &CounterState) -> i64 {
        state.count
    }
}
