//! Shared utilities: decimal quantization and interval parsing.

pub mod decimal;
pub mod interval;

pub use decimal::{
    from_fixed_point, from_fixed_point_signed, quantize, quantize_decimal, quantize_fixed,
    quantize_size, quantize_str, round_down_to_lot, to_fixed_point,
};
pub use interval::{parse_interval_ms, Interval};
