pub mod selector;

pub use selector::{OptionScreening, OptionSelector};
