//! Built-in guided modules.

pub mod breath_of_source;
pub mod collective;
pub mod earth;
pub mod liberation;
pub mod unhooking;
