//! Recovery of a module's CodeView PDB signature from its in-memory PE image.

use cat_devkit::PdbSignature;

use scroll::{Pread, LE};

/// Number of bytes of the image to read to cover its PE headers.
pub const HEADERS_LEN: u32 = 0x1000;

const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
const DEBUG_DIRECTORY_INDEX: usize = 6;
const DEBUG_ENTRY_LEN: usize = 28;
const DEBUG_TYPE_CODEVIEW: u32 = 2;
const RSDS: &[u8; 4] = b"RSDS";

/// Location (RVA and size) of some data within a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLocation {
    pub rva: u32,
    pub size: u32,
}

/// Returns the location of the debug directory, given the image headers.
pub fn debug_directory(headers: &[u8]) -> crate::Result<Option<DataLocation>> {
    let mz: u16 = headers.pread_with(0, LE)?;
    if mz != 0x5A4D {
        return Err(crate::Error::UnexpectedResponse("missing MZ header".into()));
    }

    let pe_offset = headers.pread_with::<u32>(0x3C, LE)? as usize;
    let pe_sig: u32 = headers.pread_with(pe_offset, LE)?;
    if pe_sig != 0x0000_4550 {
        return Err(crate::Error::UnexpectedResponse("missing PE header".into()));
    }

    let opt_offset = pe_offset + 24;
    let data_dirs_offset = match headers.pread_with::<u16>(opt_offset, LE)? {
        PE32_MAGIC => opt_offset + 96,
        PE32_PLUS_MAGIC => opt_offset + 112,
        magic => {
            return Err(crate::Error::UnexpectedResponse(format!(
                "optional header magic {magic:#x}"
            )));
        }
    };

    let mut offset = data_dirs_offset + DEBUG_DIRECTORY_INDEX * 8;
    let rva: u32 = headers.gread_with(&mut offset, LE)?;
    let size: u32 = headers.gread_with(&mut offset, LE)?;

    if rva == 0 || size == 0 {
        return Ok(None);
    }

    Ok(Some(DataLocation { rva, size }))
}

/// Returns the location of the CodeView data, given the debug directory.
pub fn codeview_entry(directory: &[u8]) -> crate::Result<Option<DataLocation>> {
    for entry in directory.chunks_exact(DEBUG_ENTRY_LEN) {
        let ty: u32 = entry.pread_with(12, LE)?;
        if ty != DEBUG_TYPE_CODEVIEW {
            continue;
        }

        let size: u32 = entry.pread_with(16, LE)?;
        let rva: u32 = entry.pread_with(20, LE)?;

        return Ok(Some(DataLocation { rva, size }));
    }

    Ok(None)
}

/// Parses CodeView data.
///
/// Returns `None` if it is not in the `RSDS` (PDB 7.0) format.
pub fn parse_codeview(data: &[u8]) -> crate::Result<Option<PdbSignature>> {
    if data.get(..4) != Some(&RSDS[..]) {
        return Ok(None);
    }

    let mut guid = [0u8; 16];
    guid.copy_from_slice(data.get(4..20).ok_or(scroll::Error::TooBig {
        size: 20,
        len: data.len(),
    })?);

    let age: u32 = data.pread_with(20, LE)?;

    let path = data.get(24..).and_then(|raw| {
        let raw = raw.split(|b| *b == 0).next().unwrap_or_default();
        (!raw.is_empty()).then(|| String::from_utf8_lossy(raw).into_owned())
    });

    Ok(Some(PdbSignature { guid, age, path }))
}
