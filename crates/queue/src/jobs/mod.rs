//! Job definitions.

mod deliver;

pub use deliver::DeliverJob;
