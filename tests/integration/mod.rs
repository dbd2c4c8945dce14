//! Integration tests for dhtfs

mod cli_store;
mod consensus_reads;
mod convergence;
mod debounced_writes;
mod support;
mod versioned_files;
