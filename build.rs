use std::process::Command;

fn main() {
    // Release tarballs have no .git, so CI passes the sha in explicitly.
    let git_sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .or_else(|| std::env::var("PULSE_GIT_SHA").ok())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=PULSE_GIT_SHA={git_sha}");
    println!("cargo:rerun-if-env-changed=PULSE_GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
