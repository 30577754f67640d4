//! Integrations that rely on third-party services.
//!
//! This module groups the vision oracle adapters and the browser automation
//! layer that bridge the lookup flow with the outside world.

pub mod browser;
pub mod captcha;

pub use browser::{ChromiumLauncher, ChromiumSession};
