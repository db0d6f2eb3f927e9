use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Map, Value};
use tracing::warn;

use crate::input::{Button, ScriptedPress};
use crate::scheduler::CommitPolicy;

pub const DEFAULT_LEAF_COUNT: usize = 50;
pub const DEFAULT_RENDER_MS: u64 = 20;
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Run configuration, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoSettings {
    pub leaf_count: usize,
    pub render_cost: Duration,
    pub defer_increment: bool,
    pub policy: CommitPolicy,
    pub max_restarts: u32,
    pub script: Vec<ScriptedPress>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            leaf_count: DEFAULT_LEAF_COUNT,
            render_cost: Duration::from_millis(DEFAULT_RENDER_MS),
            defer_increment: true,
            policy: CommitPolicy::default(),
            max_restarts: DEFAULT_MAX_RESTARTS,
            script: default_script(),
        }
    }
}

/// +1 then -1 twice, landing on -1.
fn default_script() -> Vec<ScriptedPress> {
    vec![
        ScriptedPress { at_ms: 0, button: Button::Increment },
        ScriptedPress { at_ms: 150, button: Button::Decrement },
        ScriptedPress { at_ms: 300, button: Button::Decrement },
    ]
}

/// Read settings from a JSON object file, or use the defaults when no path
/// is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<DemoSettings> {
    let Some(path) = path else {
        return Ok(DemoSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let map: Map<String, Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON object", path.display()))?;
    parse_settings(&map)
}

pub fn parse_settings(v: &Map<String, Value>) -> anyhow::Result<DemoSettings> {
    let mut s = DemoSettings::default();
    if let Some(n) = get_u64(v, "leafCount") {
        s.leaf_count = usize::try_from(n).context("leafCount out of range")?;
    }
    if let Some(ms) = get_u64(v, "renderMs") {
        s.render_cost = Duration::from_millis(ms);
    }
    if let Some(b) = get_bool(v, "deferIncrement") {
        s.defer_increment = b;
    }
    if let Some(p) = get_str(v, "commitPolicy") {
        s.policy = match p {
            "revalidate" => CommitPolicy::Revalidate,
            "naive" => CommitPolicy::Naive,
            other => {
                warn!(policy = other, "unknown commitPolicy, using revalidate");
                CommitPolicy::Revalidate
            }
        };
    }
    if let Some(n) = get_u64(v, "maxRestarts") {
        s.max_restarts = u32::try_from(n).context("maxRestarts out of range")?;
    }
    if let Some(script) = v.get("script") {
        s.script = serde_json::from_value(script.clone()).context("parsing script")?;
    }
    Ok(s)
}

fn get_str<'a>(v: &'a Map<String, Value>, k: &str) -> Option<&'a str> {
    v.get(k)?.as_str()
}

fn get_u64(v: &Map<String, Value>, k: &str) -> Option<u64> {
    match v.get(k) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_bool(v: &Map<String, Value>, k: &str) -> Option<bool> {
    match v.get(k) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}
