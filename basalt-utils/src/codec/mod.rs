//! Binary codecs shared between the simulation and its host.

mod int_array;

pub use int_array::{RecordError, read_int_array, write_int_array};
