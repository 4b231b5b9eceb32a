//! Mapping of `os`/`arch` pairs to Rust target triples.

/// Returns the target triple for an operating system and architecture.
///
/// Accepts both Rust names (`macos`, `x86_64`, `aarch64`) and the short names
/// commonly used by release tooling (`darwin`, `amd64`, `arm64`, `386`). An
/// `os` that already looks like a triple (contains `-`) is returned as is.
pub fn target_triple(os: &str, arch: &str) -> Option<String> {
    if os.contains('-') {
        return Some(os.to_string());
    }

    let arch = match arch {
        "amd64" | "x86_64" | "x64" => "x86_64",
        "arm64" | "aarch64" => "aarch64",
        "386" | "x86" | "i686" => "i686",
        "arm" | "armv7" => "armv7",
        "riscv64" | "riscv64gc" => "riscv64gc",
        _ => return None,
    };

    let triple = match (os, arch) {
        ("linux", "armv7") => "armv7-unknown-linux-gnueabihf".to_string(),
        ("linux", arch) => format!("{arch}-unknown-linux-gnu"),
        ("windows", "x86_64" | "i686" | "aarch64") => format!("{arch}-pc-windows-msvc"),
        ("darwin" | "macos", "x86_64" | "aarch64") => format!("{arch}-apple-darwin"),
        ("freebsd", "x86_64" | "i686") => format!("{arch}-unknown-freebsd"),
        _ => return None,
    };

    Some(triple)
}

/// File name of an executable for a given operating system.
pub(crate) fn executable_name(name: &str, os: &str) -> String {
    if os == "windows" || os.contains("-windows-") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}
