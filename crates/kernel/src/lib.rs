//! Core building blocks shared by every biblio crate: the [`Module`] trait,
//! the [`ModuleRegistry`] lifecycle driver and layered [`settings`].

pub mod module;
pub mod registry;
pub mod settings;

pub use module::{InitCtx, Module};
pub use registry::ModuleRegistry;
pub use settings::Settings;
