use std::{
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

fn main() {
    println!("cargo:rerun-if-env-changed=APP_VERSION");
    println!("cargo:rerun-if-env-changed=APP_BUILD_ID");
    println!("cargo:rerun-if-env-changed=APP_BUILD_TIMESTAMP");

    let timestamp = std::env::var("APP_BUILD_TIMESTAMP").ok().unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|_| "0".to_string())
    });

    // Release pipelines pass APP_BUILD_ID; local builds derive one from git.
    let build_id = std::env::var("APP_BUILD_ID").ok().unwrap_or_else(|| {
        let revision = Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|out| out.status.success())
            .and_then(|out| String::from_utf8(out.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "local".to_string());
        format!("{revision}-{timestamp}")
    });

    println!("cargo:rustc-env=APP_BUILD_ID={build_id}");
    println!("cargo:rustc-env=APP_BUILD_TIMESTAMP={timestamp}");
}
