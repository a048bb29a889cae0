pub mod row;
pub mod series;
pub mod target;
