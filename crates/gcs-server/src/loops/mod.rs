//! Background loops for continuous processing.

pub mod receive_loop;
