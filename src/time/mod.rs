//! Time handling: the clock abstraction every timer and curve evaluation reads.

pub mod source;
