// build.rs

use std::env;

/// Stamps the binary with a version string. `LIVERELAY_VERSION` overrides the
/// package version; non-release builds carry the profile as a suffix.
fn main() {
    let base = env::var("LIVERELAY_VERSION")
        .ok()
        .map(|v| v.trim().trim_start_matches('v').to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env::var("CARGO_PKG_VERSION").ok())
        .unwrap_or_else(|| "dev".to_string());

    let version = match env::var("PROFILE").as_deref() {
        Ok("release") | Err(_) => base,
        Ok(profile) => format!("{base}+{profile}"),
    };

    println!("cargo:rustc-env=LIVERELAY_BUILD_VERSION={version}");
    println!("cargo:rerun-if-env-changed=LIVERELAY_VERSION");
}
