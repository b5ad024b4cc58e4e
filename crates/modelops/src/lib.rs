pub mod schema;
pub mod catalog;
pub mod launch;

pub use schema::*;
pub use catalog::*;
pub use launch::*;
