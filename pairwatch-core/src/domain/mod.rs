//! Domain types: candles, intervals, pairs, position states and signals.

pub mod candle;
pub mod interval;
pub mod pair;
pub mod position;

pub use candle::{closes, Candle};
pub use interval::{Interval, IntervalError};
pub use pair::PairKey;
pub use position::{PositionState, Signal};
