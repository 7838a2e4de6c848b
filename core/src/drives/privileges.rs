/// Whether the process runs with administrator/root rights.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Whether the process runs with administrator rights.
///
/// Opening the first physical drive for reading needs elevation on Windows.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    std::fs::File::open(r"\\.\PHYSICALDRIVE0").is_ok()
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> bool {
    false
}
