//! Stamps the binary with when and from which revision it was built.
//!
//! `PIM_BUILD_TIMESTAMP` and `PIM_GIT_COMMIT` are read by `main` through `env!`
//! and logged at debug level on startup.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let built = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    println!("cargo:rustc-env=PIM_BUILD_TIMESTAMP={built}");

    let revision = git_revision().unwrap_or_else(|| String::from("unknown"));
    println!("cargo:rustc-env=PIM_GIT_COMMIT={revision}");
}

/// Short revision, suffixed with `-dirty` when the tree has local edits.
fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()
        .filter(|out| out.status.success())?;
    let revision = String::from_utf8(output.stdout).ok()?;
    let revision = revision.trim();
    (!revision.is_empty()).then(|| revision.to_string())
}
