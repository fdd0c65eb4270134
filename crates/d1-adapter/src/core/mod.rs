pub mod cursor;
pub mod features;
pub mod result;
pub mod rewrite;
pub mod schema;
pub mod value;
