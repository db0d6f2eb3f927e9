use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Increment,
    Decrement,
}

/// One entry of a press timeline, relative to the start of the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedPress {
    pub at_ms: u64,
    pub button: Button,
}

/// Where the scheduler gets button presses from.
pub trait InputSource {
    /// Next press if one is already waiting.
    fn poll(&mut self) -> Option<Button>;

    /// Block until the next press. `None` once the source is exhausted.
    fn wait(&mut self) -> Option<Button>;
}

impl InputSource for Receiver<Button> {
    fn poll(&mut self) -> Option<Button> {
        self.try_recv().ok()
    }

    fn wait(&mut self) -> Option<Button> {
        self.recv().ok()
    }
}

/// A source that never has input. Used for passes that must not yield.
pub struct Closed;

impl InputSource for Closed {
    fn poll(&mut self) -> Option<Button> {
        None
    }

    fn wait(&mut self) -> Option<Button> {
        None
    }
}

/// Replay `script` on a background thread, sending each press when it is
/// due. The sender is dropped when the script ends, closing the channel.
pub fn spawn_script(mut script: Vec<ScriptedPress>, tx: Sender<Button>) -> JoinHandle<()> {
    script.sort_by_key(|p| p.at_ms);

    std::thread::spawn(move || {
        let start = Instant::now();
        for press in script {
            let due = Duration::from_millis(press.at_ms);
            let elapsed = start.elapsed();
            if due > elapsed {
                std::thread::sleep(due - elapsed);
            }

            debug!(at_ms = press.at_ms, button = ?press.button, "press");
            if tx.send(press.button).is_err() {
                warn!("scheduler gone, dropping remaining presses");
                return;
            }
        }
    })
}

/// Deterministic source for tests: each `poll` consumes one step, where
/// `None` is a poll that finds nothing waiting.
#[cfg(test)]
pub struct Steps(std::collections::VecDeque<Option<Button>>);

#[cfg(test)]
impl Steps {
    pub fn new(steps: impl IntoIterator<Item = Option<Button>>) -> Self {
        Self(steps.into_iter().collect())
    }

    pub fn remaining(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
impl InputSource for Steps {
    fn poll(&mut self) -> Option<Button> {
        self.0.pop_front().flatten()
    }

    fn wait(&mut self) -> Option<Button> {
        while let Some(step) = self.0.pop_front() {
            if step.is_some() {
                return step;
            }
        }
        None
    }
}
