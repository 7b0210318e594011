// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for the Wireline bridge.
//!
//! Layered loading via Figment: compiled defaults, then TOML files in the
//! XDG hierarchy, then `WIRELINE_*` environment variables. All structs use
//! `#[serde(deny_unknown_fields)]` so typos in config keys fail loudly at
//! startup.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::BridgeConfig;
