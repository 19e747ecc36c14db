//! Library side of the `hhdw` command: logging setup and source inspection.

pub mod inspect;
pub mod logging;
