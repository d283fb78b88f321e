//! # parsim-cli::commands::validate
//!
//! Loads a graph file and runs the structural checks without building
//! anything.

use std::path::PathBuf;

use parsim_types::config::ConfigGraph;

pub fn exec(path: PathBuf) -> i32 {
    let graph = match ConfigGraph::from_path(&path) {
        Ok(g) => g,
        Err(e) => {
            tracing::error!(error = %e, "cannot load graph");
            return 1;
        }
    };
    let factory = parsim_elements::builtin_factory();
    let errors = graph.check_structural_errors(&factory);
    if errors.is_empty() {
        tracing::info!(
            components = graph.components.len(),
            links = graph.links.len(),
            "graph is structurally sound"
        );
        0
    } else {
        for e in &errors {
            tracing::error!(error = %e, "structural error");
        }
        1
    }
}
