//! Descriptor loading from registered filesystem roots, and per-line error
//! recording.
//!
//! Kept in its own test binary: the extension-directory setter is
//! process-wide.

use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use trellis_extension::{
    extension_class, extension_point, set_extension_directories, Extension, ExtensionError,
    ExtensionRegistry,
};

#[extension_point]
pub trait Widget: Extension {
    fn shape(&self) -> &'static str;
}

pub struct DiskWidget;
impl Extension for DiskWidget {}
impl Widget for DiskWidget {
    fn shape(&self) -> &'static str {
        "disk"
    }
}

extension_class!(
    DISK_WIDGET,
    dyn Widget,
    "loader_fs::DiskWidget",
    normal = |_inj| Ok(Box::new(DiskWidget)),
);

/// Writes the descriptor tree once and registers it as an extension root.
fn descriptor_root() -> &'static Path {
    static ROOT: OnceLock<tempfile::TempDir> = OnceLock::new();
    ROOT.get_or_init(|| {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("META-INF/trellis");
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join("loader_fs.Widget")).unwrap();
        writeln!(file, "# widgets provided by the deployment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "disk=loader_fs::DiskWidget # trailing comment").unwrap();
        writeln!(file, "ghost=loader_fs::MissingWidget").unwrap();
        drop(file);
        set_extension_directories(vec![root.path().to_path_buf()]);
        root
    })
    .path()
}

#[test]
fn descriptors_load_from_registered_directories() {
    descriptor_root();
    let registry = ExtensionRegistry::<dyn Widget>::global();
    assert_eq!(registry.get("disk").unwrap().shape(), "disk");
}

#[test]
fn unresolvable_lines_are_recorded_not_fatal() {
    descriptor_root();
    let registry = ExtensionRegistry::<dyn Widget>::global();
    // The broken `ghost` line never aborted the load...
    assert!(registry.has_extension("disk"));
    // ...and resurfaces as the cause when the name is requested.
    match registry.get("ghost").unwrap_err() {
        ExtensionError::NoSuchExtension { causes, .. } => {
            assert!(
                causes.contains("loader_fs::MissingWidget"),
                "unexpected causes: {causes}"
            );
        }
        other => panic!("expected NoSuchExtension, got {other}"),
    }
}
