pub mod entity;
pub mod tenant;
pub mod ticks;

pub use entity::*;
pub use tenant::*;
pub use ticks::{datetime_from_ticks, now_ticks, ticks_from_datetime, TICKS_PER_SECOND};
