//! Command catalog
//!
//! An explicit table of every command the dispatcher can send, built once as a
//! static. Lookup by wire token fails with `UnknownCommand` on a miss.

use crate::types::{CommandSpec, ResultType};
use crate::{Result, TelloError};

/// Enter SDK mode. Must be sent before any other command.
pub const COMMAND: CommandSpec = CommandSpec::control("command", 0);
pub const TAKEOFF: CommandSpec = CommandSpec::control("takeoff", 0);
pub const LAND: CommandSpec = CommandSpec::control("land", 0);
pub const UP: CommandSpec = CommandSpec::control("up", 1);
pub const DOWN: CommandSpec = CommandSpec::control("down", 1);
pub const LEFT: CommandSpec = CommandSpec::control("left", 1);
pub const RIGHT: CommandSpec = CommandSpec::control("right", 1);
pub const FORWARD: CommandSpec = CommandSpec::control("forward", 1);
pub const BACK: CommandSpec = CommandSpec::control("back", 1);
/// Rotate clockwise by degrees.
pub const CW: CommandSpec = CommandSpec::control("cw", 1);
/// Rotate counter-clockwise by degrees.
pub const CCW: CommandSpec = CommandSpec::control("ccw", 1);
/// Fly to `x y z` at `speed`.
pub const GO: CommandSpec = CommandSpec::control("go", 4);
/// Hover in place.
pub const STOP: CommandSpec = CommandSpec::control("stop", 0);
/// Stop all motors immediately.
pub const EMERGENCY: CommandSpec = CommandSpec::control("emergency", 0);
pub const STREAMON: CommandSpec = CommandSpec::control("streamon", 0);
pub const STREAMOFF: CommandSpec = CommandSpec::control("streamoff", 0);
/// Set speed in cm/s.
pub const SET_SPEED: CommandSpec = CommandSpec::set("speed", 1);
pub const BATTERY: CommandSpec = CommandSpec::read("battery?", ResultType::Integer);
pub const SPEED: CommandSpec = CommandSpec::read("speed?", ResultType::Float);
pub const TIME: CommandSpec = CommandSpec::read("time?", ResultType::Text);
pub const WIFI: CommandSpec = CommandSpec::read("wifi?", ResultType::Text);

/// Every command the dispatcher knows.
pub static CATALOG: CommandCatalog = CommandCatalog::new(&[
    COMMAND, TAKEOFF, LAND, UP, DOWN, LEFT, RIGHT, FORWARD, BACK, CW, CCW, GO, STOP, EMERGENCY,
    STREAMON, STREAMOFF, SET_SPEED, BATTERY, SPEED, TIME, WIFI,
]);

/// Registry mapping wire tokens to command definitions.
#[derive(Debug, Clone, Copy)]
pub struct CommandCatalog {
    specs: &'static [CommandSpec],
}

impl CommandCatalog {
    pub const fn new(specs: &'static [CommandSpec]) -> Self {
        Self { specs }
    }

    /// The built-in catalog.
    pub fn standard() -> &'static CommandCatalog {
        &CATALOG
    }

    pub fn get(&self, name: &str) -> Option<&'static CommandSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Look up a command, failing with `UnknownCommand` on a miss.
    pub fn lookup(&self, name: &str) -> Result<&'static CommandSpec> {
        self.get(name).ok_or_else(|| TelloError::unknown_command(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static CommandSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        CATALOG
    }
}
