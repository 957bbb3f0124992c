//! Petri net model, token game and PNML interchange.

pub mod config;
pub mod net;
pub mod options;
