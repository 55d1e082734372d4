//! Symbol-name helpers shared by profile matching.

/// Markers appended to symbols that were privatized or specialized at link
/// time, each followed by a hash tail.
const LTO_NAME_MARKERS: [&str; 4] = [".__uniq.", ".lto_priv.", ".constprop.", ".llvm."];

/// Common name of an LTO-mangled symbol: the prefix up to and including the
/// first recognized marker, with the hash tail dropped. `foo.llvm.123` and
/// `foo.llvm.456` both map to `foo.llvm.`. `None` when the symbol carries
/// no such marker.
pub fn lto_common_name(name: &str) -> Option<&str> {
    for marker in LTO_NAME_MARKERS {
        if let Some(pos) = name.find(marker) {
            return Some(&name[..pos + marker.len()]);
        }
    }
    None
}

/// Strip the `"(*…"` disambiguator a profile producer appends to function
/// names it could not resolve uniquely.
pub fn strip_disambiguator(name: &str) -> &str {
    match name.find("(*") {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Restore a symbol spelling uniquified by the front end, which appends
/// `/suffix` parts after the original name.
pub fn restore_name(name: &str) -> &str {
    if name.starts_with('/') {
        return name;
    }
    match name.find('/') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// True for local symbols uniquified with their defining file name
/// (`sym/file.c/1`).
pub fn is_file_uniquified_local(name: &str) -> bool {
    !name.starts_with('/') && name.bytes().filter(|&b| b == b'/').count() == 2
}
