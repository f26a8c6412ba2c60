// Library half of the `otter` binary.
//
// Everything the binary wires together lives here so the instance
// coordinator can be driven from tests without a real window system.

pub mod actions;
pub mod app;
pub mod cli;
pub mod consts;
pub mod endpoint;
pub mod instance;
pub mod journal;
pub mod paths;
pub mod sessions;
pub mod settings;
pub mod windows;
