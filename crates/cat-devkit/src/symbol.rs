use std::fmt::Write;
use std::future::Future;

use crate::event::ModuleInfo;

/// CodeView signature identifying the PDB built alongside a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbSignature {
    /// PDB GUID, in its on-disk (mixed-endian) byte layout.
    pub guid: [u8; 16],

    /// PDB age.
    pub age: u32,

    /// PDB path recorded by the linker, if any.
    pub path: Option<String>,
}

impl PdbSignature {
    /// Returns the Breakpad debug identifier of this signature.
    ///
    /// This is the uppercase GUID (without dashes) immediately followed by the
    /// age, in hexadecimal. Symbol servers and `wholesym` use this format.
    pub fn breakpad_id(&self) -> String {
        let g = &self.guid;

        let data1 = u32::from_le_bytes([g[0], g[1], g[2], g[3]]);
        let data2 = u16::from_le_bytes([g[4], g[5]]);
        let data3 = u16::from_le_bytes([g[6], g[7]]);

        let mut id = format!("{data1:08X}{data2:04X}{data3:04X}");
        for b in &g[8..] {
            let _ = write!(id, "{b:02X}");
        }
        let _ = write!(id, "{:X}", self.age);

        id
    }

    /// Returns the file name of the recorded PDB path, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(|path| path.rsplit(['\\', '/']).next())
            .filter(|name| !name.is_empty())
    }
}

/// Trait implementing a debug symbol store.
pub trait SymbolLookup: Send + Sync + 'static {
    /// Resolves the runtime address of a function symbol within a module.
    ///
    /// Returns `None` if no debug information matching `signature` could be
    /// found, or if it does not define `symbol`.
    fn lookup(
        &self,
        symbol: &str,
        module: &ModuleInfo,
        signature: &PdbSignature,
    ) -> impl Future<Output = Option<u32>> + Send;
}
