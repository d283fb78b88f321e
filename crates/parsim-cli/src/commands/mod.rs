pub mod list_partitioners;
pub mod run;
pub mod validate;
