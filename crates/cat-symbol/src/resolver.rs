use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use cat_devkit::{ModuleInfo, PdbSignature, SymbolLookup};

use futures_util::StreamExt;

use tokio_stream::wrappers::ReadDirStream;
use tracing::Instrument;

use wholesym::{SymbolManager, SymbolManagerConfig, SymbolMap};

/// Extensions of the symbol files searched within the symbol directory.
const SYMBOL_FILE_EXTENSIONS: [&str; 2] = ["xdb", "pdb"];

/// Symbol store searching a directory for a title's debug symbols.
pub struct SymbolResolver {
    /// Directory containing the title's symbol files.
    symbols_dir: PathBuf,

    /// Binary symbol resolver.
    symbol_manager: SymbolManager,

    /// Symbols already loaded, by file path.
    symbol_maps: Mutex<HashMap<PathBuf, Arc<SymbolMap>>>,
}

impl SymbolResolver {
    /// Creates a new resolver over the given symbol directory.
    pub fn new(symbols_dir: impl Into<PathBuf>) -> Self {
        Self {
            symbols_dir: symbols_dir.into(),
            symbol_manager: SymbolManager::with_config(SymbolManagerConfig::default()),
            symbol_maps: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the symbol directory of this resolver.
    pub fn symbols_dir(&self) -> &Path {
        &self.symbols_dir
    }

    /// Resolves the runtime address of `symbol` within the given module.
    ///
    /// Returns `None` if no symbol file matches the module's signature, or if
    /// the matching symbol file does not define `symbol`.
    #[tracing::instrument(name = "Resolve", skip_all, fields(symbol = %symbol, module = %module.name))]
    pub async fn resolve(
        &self,
        symbol: &str,
        module: &ModuleInfo,
        signature: &PdbSignature,
    ) -> crate::Result<Option<u32>> {
        let debug_id = signature.breakpad_id();

        for path in self.candidate_files(signature).await? {
            let symbol_map = match self.symbol_map(&path).await {
                Ok(symbol_map) => symbol_map,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping symbol file");
                    continue;
                }
            };

            let file_id = symbol_map.debug_id().breakpad().to_string();
            if !file_id.eq_ignore_ascii_case(&debug_id) {
                tracing::trace!(path = %path.display(), %file_id, "signature mismatch");
                continue;
            }

            let offset = symbol_map
                .iter_symbols()
                .find_map(|(offset, name)| (name == symbol).then_some(offset));

            return Ok(offset.map(|offset| module.base_addr.wrapping_add(offset)));
        }

        Ok(None)
    }

    /// Lists the symbol files that may match the given signature.
    ///
    /// Files named after the PDB recorded in the signature come first.
    pub async fn candidate_files(&self, signature: &PdbSignature) -> crate::Result<Vec<PathBuf>> {
        let mut files = find_symbol_files(&self.symbols_dir).await?;

        if let Some(stem) = signature
            .file_name()
            .map(Path::new)
            .and_then(Path::file_stem)
        {
            files.sort_by_key(|path| path.file_stem() != Some(stem));
        }

        if let Some(recorded) = signature.path.as_deref().map(Path::new) {
            let exists = tokio::fs::try_exists(recorded).await.unwrap_or_default();

            if exists && !files.iter().any(|path| path == recorded) {
                files.insert(0, recorded.to_path_buf());
            }
        }

        Ok(files)
    }

    async fn symbol_map(&self, path: &Path) -> crate::Result<Arc<SymbolMap>> {
        let cached = self
            .symbol_maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned();

        if let Some(symbol_map) = cached {
            return Ok(symbol_map);
        }

        let symbol_map = self
            .symbol_manager
            .load_symbol_map_for_binary_at_path(path, None)
            .instrument(tracing::info_span!("LoadSymbols", path = %path.display()))
            .await?;
        let symbol_map = Arc::new(symbol_map);

        self.symbol_maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), symbol_map.clone());

        Ok(symbol_map)
    }
}

impl SymbolLookup for SymbolResolver {
    async fn lookup(
        &self,
        symbol: &str,
        module: &ModuleInfo,
        signature: &PdbSignature,
    ) -> Option<u32> {
        match self.resolve(symbol, module, signature).await {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(symbol, module = %module.name, error = %e, "symbol lookup failed");
                None
            }
        }
    }
}

/// Recursively lists the symbol files within the given directory.
async fn find_symbol_files(dir: &Path) -> crate::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut dirs = vec![dir.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| crate::Error::File(dir.clone(), e))?;
        let mut entries = ReadDirStream::new(entries);

        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|e| crate::Error::File(dir.clone(), e))?;
            let path = entry.path();

            let file_type = entry
                .file_type()
                .await
                .map_err(|e| crate::Error::File(path.clone(), e))?;

            if file_type.is_dir() {
                dirs.push(path);
            } else if path
                .extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| {
                    SYMBOL_FILE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
            {
                files.push(path);
            }
        }
    }

    files.sort();

    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use test_log::test;

    use super::find_symbol_files;

    #[test(tokio::test)]
    async fn scan_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("Release/Xenon")).unwrap();
        std::fs::write(root.join("default.XDB"), b"").unwrap();
        std::fs::write(root.join("Release/Xenon/default.pdb"), b"").unwrap();
        std::fs::write(root.join("Release/default.map"), b"").unwrap();

        let files = find_symbol_files(root).await.unwrap();
        let files: Vec<_> = files
            .iter()
            .map(|path| path.strip_prefix(root).unwrap())
            .collect();

        assert_eq!(
            files,
            [
                Path::new("Release/Xenon/default.pdb"),
                Path::new("default.XDB")
            ]
        );
    }

    #[test(tokio::test)]
    async fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_symbol_files(&dir.path().join("missing")).await.is_err());
    }
}
