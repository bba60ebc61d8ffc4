use std::env;
use std::process::Command;

const DEFAULT_KVM_PATH: &str = "/usr/bin/kvm";
const DEFAULT_VIF_OVERRIDE: &str = "/etc/kvmhv/kvm-vif-bridge";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=KVMHV_BUILD_KVM_PATH");
    println!("cargo:rerun-if-env-changed=KVMHV_BUILD_VIF_OVERRIDE");

    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let version = match git_short_sha() {
        Some(sha) => format!("{pkg_version} ({sha})"),
        None => pkg_version,
    };
    println!("cargo:rustc-env=KVMHV_VERSION={version}");

    // Packagers bake host-specific locations in at build time.
    let kvm_path = build_setting("KVMHV_BUILD_KVM_PATH", DEFAULT_KVM_PATH);
    let vif_override = build_setting("KVMHV_BUILD_VIF_OVERRIDE", DEFAULT_VIF_OVERRIDE);
    println!("cargo:rustc-env=KVMHV_DEFAULT_KVM_PATH={kvm_path}");
    println!("cargo:rustc-env=KVMHV_DEFAULT_VIF_OVERRIDE={vif_override}");
}

fn build_setting(var: &str, fallback: &str) -> String {
    env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if sha.is_empty() { None } else { Some(sha) }
}
