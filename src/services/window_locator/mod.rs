//! WindowLocator service: responsibility and boundaries
//!
//! This module is responsible ONLY for finding and validating the target
//! window (by class+title or exact title) and reporting its rectangle.
//! It MUST NOT capture frames or make any decisions about key input.

mod locator;
mod r#trait;
mod xcap_system;

pub use self::locator::{find_by_exact_title, WindowLocator};
pub use self::r#trait::WindowSystem;
pub use self::xcap_system::XcapWindowSystem;

#[cfg(test)]
pub(crate) use self::r#trait::testing;
