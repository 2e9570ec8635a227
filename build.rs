//! Build script: embeds the git hash and pre-flights the audio toolchain.
//!
//! A missing ffmpeg/ffprobe does not fail the build; the service still runs,
//! but every job would fail at the assembly step, so we say so up front.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    for tool in ["ffmpeg", "ffprobe"] {
        check_tool(tool);
    }
}

fn check_tool(tool: &str) {
    match Command::new(tool).arg("-version").output() {
        Ok(out) if out.status.success() => {}
        _ => {
            println!(
                "cargo::warning={} not found on PATH: audio assembly will fail at runtime",
                tool
            );
            println!("cargo::warning=  Ubuntu/Debian: sudo apt install ffmpeg");
            println!("cargo::warning=  Arch:          sudo pacman -S ffmpeg");
        }
    }
}
