//! Value types produced by expression evaluation

pub mod value;

pub use value::ExprValue;
