use std::process::Command;

/// Short commit hash shown in the server banner. Release builds outside a
/// checkout pass it in through `STUDYHUB_GIT_SHA`.
fn git_sha() -> String {
    std::env::var("STUDYHUB_GIT_SHA")
        .ok()
        .filter(|sha| !sha.is_empty())
        .or_else(|| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })
        .unwrap_or_else(|| "dev".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_SHA={}", git_sha());
    println!("cargo:rerun-if-env-changed=STUDYHUB_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
