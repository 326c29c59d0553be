//! UI module root: exposes drawing functions for individual panels.

pub mod detailed;
pub mod devices;
pub mod flame;
pub mod header;
pub mod net;
pub mod overview;
pub mod processes;
pub mod theme;
pub mod util;
