#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod cli;
pub mod config;
pub mod domain_xml;
pub mod engine;
pub mod error;
pub mod image;
pub mod qcow2;
pub mod spec;
pub mod util;
