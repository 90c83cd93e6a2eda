// Once clippy takes `clippy.toml` into account (for `tests` targets),
// we can remove these.
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]

use cat_devkit::{ModuleInfo, PdbSignature, SymbolLookup};
use cat_symbol::SymbolResolver;
use test_log::test;

fn module() -> ModuleInfo {
    ModuleInfo {
        name: "default.xex".to_owned(),
        base_addr: 0x8200_0000,
        size: 0x00C4_0000,
    }
}

fn signature(path: &str) -> PdbSignature {
    PdbSignature {
        guid: [0x11; 16],
        age: 1,
        path: Some(path.to_owned()),
    }
}

#[test(tokio::test)]
async fn matching_file_name_first() {
    let dir = tempfile::tempdir().unwrap();

    std::fs::write(dir.path().join("audio.pdb"), b"").unwrap();
    std::fs::write(dir.path().join("default.xdb"), b"").unwrap();
    std::fs::write(dir.path().join("engine.pdb"), b"").unwrap();

    let resolver = SymbolResolver::new(dir.path());
    let files = resolver
        .candidate_files(&signature(r"x:\build\xenon\default.pdb"))
        .await
        .unwrap();

    let names: Vec<_> = files
        .iter()
        .map(|path| path.file_name().unwrap().to_str().unwrap())
        .collect();

    assert_eq!(names, ["default.xdb", "audio.pdb", "engine.pdb"]);
}

#[test(tokio::test)]
async fn unreadable_symbols_are_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("default.pdb"), b"not a pdb").unwrap();

    let resolver = SymbolResolver::new(dir.path());

    let addr = resolver
        .resolve("XamShowMessageBoxUI", &module(), &signature("default.pdb"))
        .await
        .unwrap();
    assert_eq!(addr, None);
}

#[test(tokio::test)]
async fn missing_directory_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = SymbolResolver::new(dir.path().join("missing"));

    assert!(
        resolver
            .resolve("main", &module(), &signature("default.pdb"))
            .await
            .is_err()
    );

    let addr = resolver
        .lookup("main", &module(), &signature("default.pdb"))
        .await;
    assert_eq!(addr, None);
}
