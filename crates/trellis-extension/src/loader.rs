//! Descriptor loading: strategies, directories, and line parsing.
//!
//! Descriptor files are UTF-8 text, one extension per line, either
//! `name=type::path` or a bare `type::path`. `#` starts a comment and blank
//! lines are skipped. The file basename is the extension point's dotted
//! qualified id; for every lookup the loader also tries the basename with
//! the pre-rename `lattice` prefix, so community files written before the
//! project rename keep loading.

use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::class::{self, ClassTable};
use crate::error::ExtensionError;
use crate::point::ExtensionPoint;

/// Directory prefix for the framework's own descriptor files.
pub const DIR_INTERNAL: &str = "META-INF/trellis/internal/";

/// Directory prefix for application descriptor files.
pub const DIR_FRAMEWORK: &str = "META-INF/trellis/";

/// Directory prefix kept for plain service-registration files.
pub const DIR_SERVICES: &str = "META-INF/services/";

/// The crate prefix in current descriptor basenames.
const CANONICAL_PREFIX: &str = "trellis";

/// The project's pre-rename crate prefix, still accepted in basenames.
const LEGACY_PREFIX: &str = "lattice";

/// A prioritized recipe governing descriptor discovery.
#[derive(Debug, Clone)]
pub struct LoadingStrategy {
    /// Display name for diagnostics.
    pub name: &'static str,
    /// Directory prefix searched by this strategy.
    pub directory: &'static str,
    /// Whether catalog lookup prefers built-in records over runtime
    /// registrations.
    pub prefer_builtin: bool,
    /// Whether definitions from this strategy may replace earlier ones.
    pub overridable: bool,
    /// Type-path prefixes this strategy refuses to load.
    pub excluded: &'static [&'static str],
    /// Sort key; lower loads first. The sort is stable.
    pub priority: i32,
}

fn default_strategies() -> Vec<LoadingStrategy> {
    vec![
        LoadingStrategy {
            name: "internal",
            directory: DIR_INTERNAL,
            prefer_builtin: true,
            overridable: false,
            excluded: &[],
            priority: i32::MIN,
        },
        LoadingStrategy {
            name: "framework",
            directory: DIR_FRAMEWORK,
            prefer_builtin: true,
            overridable: true,
            excluded: &[],
            priority: 0,
        },
        LoadingStrategy {
            name: "services",
            directory: DIR_SERVICES,
            prefer_builtin: false,
            overridable: true,
            excluded: &[],
            priority: i32::MAX,
        },
    ]
}

fn strategies() -> &'static RwLock<Vec<LoadingStrategy>> {
    static STRATEGIES: OnceLock<RwLock<Vec<LoadingStrategy>>> = OnceLock::new();
    STRATEGIES.get_or_init(|| RwLock::new(default_strategies()))
}

/// The active strategies, sorted by priority (stable).
pub fn loading_strategies() -> Vec<LoadingStrategy> {
    let mut out = strategies().read().clone();
    out.sort_by_key(|s| s.priority);
    out
}

/// Replaces the active strategies. Registries created afterwards observe the
/// new set; already-loaded class tables are unaffected.
pub fn set_loading_strategies(list: Vec<LoadingStrategy>) {
    *strategies().write() = list;
}

/// Appends one strategy.
pub fn add_loading_strategy(strategy: LoadingStrategy) {
    strategies().write().push(strategy);
}

fn directories() -> &'static RwLock<Vec<PathBuf>> {
    static DIRS: OnceLock<RwLock<Vec<PathBuf>>> = OnceLock::new();
    DIRS.get_or_init(|| RwLock::new(Vec::new()))
}

/// The filesystem roots searched for descriptor files, in order.
pub fn extension_directories() -> Vec<PathBuf> {
    directories().read().clone()
}

/// Replaces the filesystem roots searched for descriptor files.
pub fn set_extension_directories(dirs: Vec<PathBuf>) {
    *directories().write() = dirs;
}

/// Appends one filesystem root.
pub fn add_extension_directory(dir: PathBuf) {
    directories().write().push(dir);
}

// =============================================================================
// Line parsing
// =============================================================================

/// A successfully parsed descriptor line.
struct ParsedLine {
    names: Vec<String>,
    type_path: String,
}

/// Parses one line; `Ok(None)` for blanks and comments.
fn parse_line<T: ?Sized + ExtensionPoint>(raw: &str) -> Result<Option<ParsedLine>, String> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (names, type_path) = match line.split_once('=') {
        Some((name, path)) => {
            let path = path.trim();
            if path.is_empty() {
                return Err(format!("line `{line}` has no type path"));
            }
            let names: Vec<String> = name
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            if names.is_empty() {
                return Err(format!("line `{line}` has an empty name"));
            }
            (names, path.to_string())
        }
        None => (vec![derive_name::<T>(line)], line.to_string()),
    };
    Ok(Some(ParsedLine { names, type_path }))
}

/// Derives a name from a bare type path: the simple type name, minus the
/// point's simple name as a suffix when present, lowercased.
fn derive_name<T: ?Sized + ExtensionPoint>(type_path: &str) -> String {
    let simple = type_path.rsplit("::").next().unwrap_or(type_path);
    let stripped = simple.strip_suffix(T::NAME).filter(|s| !s.is_empty());
    stripped.unwrap_or(simple).to_lowercase()
}

// =============================================================================
// Class-table construction
// =============================================================================

/// The dotted descriptor basenames tried for a point: canonical first, then
/// the legacy-prefixed form.
fn basenames<T: ?Sized + ExtensionPoint>() -> Vec<String> {
    let canonical = T::QUALIFIED.replace("::", ".");
    let mut out = vec![canonical.clone()];
    if let Some(rest) = canonical.strip_prefix(CANONICAL_PREFIX) {
        out.push(format!("{LEGACY_PREFIX}{rest}"));
    }
    out
}

/// Gathers descriptor contents for one `(strategy, basename)` pair: embedded
/// resources first, then files under the registered roots.
fn descriptor_sources(directory: &str, basename: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for res in class::DESCRIPTOR_RESOURCES.iter() {
        if res.directory == directory && res.basename == basename {
            out.push((
                format!("embedded:{}{}", res.directory, res.basename),
                res.contents.to_string(),
            ));
        }
    }
    for root in extension_directories() {
        let path = root.join(directory).join(basename);
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => out.push((path.display().to_string(), contents)),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Failed to read descriptor file"
            ),
        }
    }
    out
}

/// Performs the one-shot descriptor load for an extension point.
///
/// Per-line failures are recorded in the table's `exceptions` map and do not
/// abort the load; conflicting adaptive declarations are fatal.
pub(crate) fn load_class_table<T: ?Sized + ExtensionPoint>()
-> Result<ClassTable<T>, ExtensionError> {
    let default_name = T::DEFAULT_NAME
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != crate::TRUE_VALUE)
        .map(str::to_string);
    let mut table = ClassTable::new(default_name);

    for strategy in loading_strategies() {
        for basename in basenames::<T>() {
            for (source, contents) in descriptor_sources(strategy.directory, &basename) {
                load_descriptor(&mut table, &strategy, &source, &contents)?;
            }
        }
    }

    debug!(
        point = T::QUALIFIED,
        extensions = table.classes.len(),
        wrappers = table.wrappers.len(),
        "Loaded extension classes"
    );
    Ok(table)
}

fn load_descriptor<T: ?Sized + ExtensionPoint>(
    table: &mut ClassTable<T>,
    strategy: &LoadingStrategy,
    source: &str,
    contents: &str,
) -> Result<(), ExtensionError> {
    for raw in contents.lines() {
        let line_key = raw.split('#').next().unwrap_or("").trim().to_string();
        let parsed = match parse_line::<T>(raw) {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(msg) => {
                warn!(source, line = %line_key, error = %msg, "Skipping descriptor line");
                table.exceptions.insert(line_key, msg);
                continue;
            }
        };

        if strategy
            .excluded
            .iter()
            .any(|prefix| parsed.type_path.starts_with(prefix))
        {
            debug!(
                source,
                type_path = %parsed.type_path,
                strategy = strategy.name,
                "Type path excluded by loading strategy"
            );
            continue;
        }

        let class = match class::resolve_class::<T>(&parsed.type_path, strategy.prefer_builtin) {
            Ok(c) => c,
            Err(msg) => {
                warn!(source, line = %line_key, error = %msg, "Skipping descriptor line");
                table.exceptions.insert(line_key, msg);
                continue;
            }
        };

        if class.is_adaptive() {
            match table.adaptive.as_ref().map(|e| e.type_path()) {
                Some(existing) if existing != class.type_path() => {
                    if strategy.overridable {
                        table.adaptive = Some(class);
                    } else {
                        return Err(ExtensionError::MultipleAdaptive {
                            point: T::QUALIFIED,
                            existing: existing.to_string(),
                            duplicate: class.type_path().to_string(),
                        });
                    }
                }
                Some(_) => {}
                None => table.adaptive = Some(class),
            }
        } else if class.is_wrapper() {
            if !table
                .wrappers
                .iter()
                .any(|w| w.type_path() == class.type_path())
            {
                table.wrappers.push(class);
            }
        } else {
            save_normal(table, strategy, &parsed.names, class);
        }
    }
    Ok(())
}

/// Registers a normal class under each of its names, honoring override and
/// poisoning semantics.
fn save_normal<T: ?Sized + ExtensionPoint>(
    table: &mut ClassTable<T>,
    strategy: &LoadingStrategy,
    names: &[String],
    class: crate::ExtensionClass<T>,
) {
    let first = &names[0];
    if let Some(info) = class.activate() {
        table.activates.insert(first.clone(), info.clone());
    }
    table
        .names
        .entry(class.type_path())
        .or_insert_with(|| first.clone());

    for name in names {
        if table.poisoned.contains(name) {
            if strategy.overridable {
                table.poisoned.remove(name);
                table.exceptions.remove(name);
            } else {
                continue;
            }
        }
        match table.classes.get(name) {
            None => {
                table.classes.insert(name.clone(), class.clone());
            }
            Some(existing) if existing.type_path() == class.type_path() => {}
            Some(existing) => {
                if strategy.overridable {
                    table.classes.insert(name.clone(), class.clone());
                } else {
                    let err = ExtensionError::DuplicateExtension {
                        point: T::QUALIFIED,
                        name: name.clone(),
                        existing: existing.type_path().to_string(),
                        duplicate: class.type_path().to_string(),
                    };
                    warn!(error = %err, "Poisoning duplicate extension name");
                    table.classes.remove(name);
                    table.poisoned.insert(name.clone());
                    table.exceptions.insert(name.clone(), err.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Lifecycle;

    struct ProbePoint;

    impl ExtensionPoint for ProbePoint {
        const NAME: &'static str = "Probe";
        const QUALIFIED: &'static str = "trellis_probe::scan::Probe";

        fn lifecycle_of(_instance: &Self) -> Option<&dyn Lifecycle> {
            None
        }
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert!(parse_line::<ProbePoint>("").unwrap().is_none());
        assert!(parse_line::<ProbePoint>("   # just a comment").unwrap().is_none());
    }

    #[test]
    fn named_lines_split_on_the_equals_sign() {
        let parsed = parse_line::<ProbePoint>("fast=probe::FastProbe # inline note")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.names, vec!["fast".to_string()]);
        assert_eq!(parsed.type_path, "probe::FastProbe");
    }

    #[test]
    fn comma_separated_names_share_one_class() {
        let parsed = parse_line::<ProbePoint>("a, b=probe::DualProbe").unwrap().unwrap();
        assert_eq!(parsed.names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_type_path_is_an_error() {
        assert!(parse_line::<ProbePoint>("fast=").is_err());
    }

    #[test]
    fn bare_lines_derive_the_name_from_the_type() {
        let parsed = parse_line::<ProbePoint>("probe::SlowProbe").unwrap().unwrap();
        assert_eq!(parsed.names, vec!["slow".to_string()]);
        // Without the point-name suffix the whole segment lowercases.
        let parsed = parse_line::<ProbePoint>("probe::Sensor").unwrap().unwrap();
        assert_eq!(parsed.names, vec!["sensor".to_string()]);
    }

    #[test]
    fn basenames_try_the_legacy_prefix_too() {
        assert_eq!(
            basenames::<ProbePoint>(),
            vec![
                "trellis_probe.scan.Probe".to_string(),
                "lattice_probe.scan.Probe".to_string(),
            ]
        );
    }
}
