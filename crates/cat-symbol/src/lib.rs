//! This crate provides the symbol store used by CAT to resolve the runtime
//! address of title functions.
//!
//! Debug symbols of a title (`.xdb` / `.pdb` files) are searched within a
//! symbol directory. A symbol file is only used if its debug identifier
//! matches the PDB signature of the loaded module.
//!
//! # Example
//!
//! ```no_run
//! use cat_devkit::{ModuleInfo, PdbSignature};
//! use cat_symbol::SymbolResolver;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = SymbolResolver::new("D:/Builds/MyTitle/Symbols");
//!
//!     let module = ModuleInfo {
//!         name: "default.xex".to_owned(),
//!         base_addr: 0x82000000,
//!         size: 0x00c40000,
//!     };
//!     let signature = PdbSignature {
//!         guid: [0; 16],
//!         age: 1,
//!         path: Some("default.pdb".to_owned()),
//!     };
//!
//!     let addr = resolver
//!         .resolve("XamShowMessageBoxUI", &module, &signature)
//!         .await
//!         .unwrap();
//! }
//! ```

mod error;
mod resolver;

pub use self::error::{Error, Result};
pub use self::resolver::SymbolResolver;
