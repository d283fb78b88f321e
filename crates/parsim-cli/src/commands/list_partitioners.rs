//! # parsim-cli::commands::list_partitioners

use parsim_core::partition::PartitionerRegistry;

pub fn exec() -> i32 {
    for name in PartitionerRegistry::standard().names() {
        println!("{name}");
    }
    0
}
