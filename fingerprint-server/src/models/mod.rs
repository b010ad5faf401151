//! Request and response models

pub mod device;
pub mod event;
pub mod identify;

pub use device::*;
pub use event::*;
pub use identify::*;
