// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");

    // Packagers may pin the version explicitly
    println!("cargo::rerun-if-env-changed=DEPTH_GREENSCREEN_VERSION");
    let version = if let Ok(v) = std::env::var("DEPTH_GREENSCREEN_VERSION") {
        v
    } else {
        get_git_version()
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn get_git_version() -> String {
    // "v0.3.0" on a tag, "v0.3.0-5-gabcdef1" five commits past it
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output();

    let version = match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => return env!("CARGO_PKG_VERSION").to_string(),
    };

    let version = version.strip_prefix('v').unwrap_or(&version);

    // Untagged history: "<crate version>+g<hash>"
    if !version.contains('.') {
        return format!("{}+g{}", env!("CARGO_PKG_VERSION"), version);
    }

    // Past a tag: "0.3.0-5-gabcdef1" becomes "0.3.0+5.abcdef1"
    let parts: Vec<&str> = version.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, commits, base] => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            format!("{}+{}.{}", base, commits, hash)
        }
        _ => version.to_string(),
    }
}
