//! Grammar specs for the compiled-in languages
//!
//! Each submodule describes one tree-sitter grammar declaratively and
//! submits a [`LanguageDescriptor`](crate::LanguageDescriptor) for it.

mod go;
mod javascript;
mod python;
mod rust;
mod typescript;
