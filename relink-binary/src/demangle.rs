//! Demangling helpers for Rust and C++ symbols.

/// Demangle a symbol string. Returns None if demangling fails or is not
/// applicable.
pub fn demangle(s: &str) -> Option<String> {
    if is_rust_mangled(s) {
        demangle_rust(s)
    } else if is_itanium_cpp_mangled(s) {
        demangle_cpp(s)
    } else {
        None
    }
}

/// Demangle a symbol string, falling back to the original spelling.
pub fn demangle_or_original(s: &str) -> String {
    demangle(s).unwrap_or_else(|| s.to_string())
}

/// Fully-qualified declaration context of a demangled name: everything
/// before the last `::` separator outside template or argument brackets,
/// with any parameter list removed. Empty when the name has no qualifying
/// context.
pub fn declaration_context(demangled: &str) -> String {
    let name = strip_hash_suffix(demangled);
    let name = strip_parameter_list(name);
    let bytes = name.as_bytes();
    let mut depth = 0usize;
    let mut last_sep = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'(' | b'[' => depth += 1,
            b'>' | b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && i + 1 < bytes.len() && bytes[i + 1] == b':' => {
                last_sep = Some(i);
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    match last_sep {
        Some(pos) => name[..pos].to_string(),
        None => String::new(),
    }
}

/// Heuristic: Rust v0 mangling starts with "_R".
pub fn is_rust_mangled(s: &str) -> bool {
    s.starts_with("_R") || looks_like_legacy_rust(s)
}

fn looks_like_legacy_rust(s: &str) -> bool {
    s.starts_with("_ZN") && s.contains("17h") && s.ends_with('E')
}

/// Heuristic: Itanium C++ mangling starts with "_Z".
pub fn is_itanium_cpp_mangled(s: &str) -> bool {
    s.starts_with("_Z")
}

fn demangle_rust(s: &str) -> Option<String> {
    match rustc_demangle::try_demangle(s) {
        Ok(sym) => Some(sym.to_string()),
        Err(_) => None,
    }
}

fn demangle_cpp(s: &str) -> Option<String> {
    match cpp_demangle::Symbol::new(s) {
        Ok(sym) => Some(sym.to_string()),
        Err(_) => None,
    }
}

// Strip a trailing ::hxxxxxxxx legacy-Rust hash if present. Require at
// least 8 hex digits to avoid truncating valid names like "foo::h264".
fn strip_hash_suffix(full: &str) -> &str {
    match full.rfind("::h") {
        Some(pos) => {
            let start = pos + 3;
            if start < full.len() {
                let suffix = &full[start..];
                if suffix.len() >= 8 && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
                    &full[..pos]
                } else {
                    full
                }
            } else {
                full
            }
        }
        None => full,
    }
}

// Cut the name at a parameter list opening outside template brackets.
fn strip_parameter_list(name: &str) -> &str {
    let mut depth = 0usize;
    for (i, c) in name.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth = depth.saturating_sub(1),
            '(' if depth == 0 => return &name[..i],
            _ => {}
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_itanium() {
        let demangled = demangle("_ZN2ns3barEv").unwrap();
        assert!(demangled.starts_with("ns::bar"));
    }

    #[test]
    fn test_demangle_unmangled_falls_back() {
        assert_eq!(demangle("plain_c_function"), None);
        assert_eq!(demangle_or_original("plain_c_function"), "plain_c_function");
    }

    #[test]
    fn test_declaration_context_plain() {
        assert_eq!(declaration_context("ns::bar"), "ns");
        assert_eq!(declaration_context("a::b::c"), "a::b");
        assert_eq!(declaration_context("main"), "");
    }

    #[test]
    fn test_declaration_context_skips_arguments_and_templates() {
        assert_eq!(declaration_context("ns::bar(int, float)"), "ns");
        assert_eq!(
            declaration_context("ns::Widget<std::pair<int, int>>::get"),
            "ns::Widget<std::pair<int, int>>"
        );
    }

    #[test]
    fn test_declaration_context_strips_legacy_rust_hash() {
        assert_eq!(declaration_context("ns::bar::h0123456789abcdef"), "ns");
    }
}
