//
// lib.rs
// Dicom-Worklist-rs
//
// Exposes the encoder core, the outer layers and the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Encoder core: values, elements, sequences, file meta and data set assembly.
pub mod assembler;
pub mod dataset;
pub mod element;
pub mod error;
pub mod file;
pub mod file_meta;
pub mod format;
pub mod records;
pub mod sequence;
pub mod tags;
pub mod vr;

// Outer layers: each module mirrors a CLI verb or an API concern.
pub mod batch;
pub mod cli;
pub mod config;
pub mod dump;
pub mod models;
pub mod scu;
pub mod storage;
pub mod validate;
pub mod web;

pub use assembler::DataSetTemplate;
pub use cli::{run as run_cli, Cli, Commands};
pub use error::{Error, Result};
pub use file::{decode_file, encode_file, encode_instance, encode_worklist};
