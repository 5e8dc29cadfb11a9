//! Value model and its binary codec.

pub mod codec;
pub mod coerce;
pub mod io;
pub mod store;
pub mod value;

pub use codec::{CodecLimits, CodecMode, ValueCodec};
pub use store::{Complex, Factor, NA_INTEGER, Names, Real, Store, StoreShape, StoreType};
pub use value::{
    Array, Attributes, DataFrame, Environment, Function, List, Reference, S4Object, Value, Vector,
};
