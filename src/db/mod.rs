pub mod dbpaths;

pub use dbpaths::PgPathStore;
