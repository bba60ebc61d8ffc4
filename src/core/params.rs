//! Hypervisor parameters and their two validation phases.
//!
//! [`HvParams::check_syntax`] needs nothing but the values and can run anywhere in
//! the cluster when parameters are defined. [`HvParams::check_runtime`] looks at the
//! local filesystem and only makes sense on the node about to run the instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const KERNEL_PATH: &str = "kernel_path";
pub const INITRD_PATH: &str = "initrd_path";
pub const ACPI: &str = "acpi";

/// Every parameter this hypervisor understands.
pub const PARAMETERS: [&str; 3] = [KERNEL_PATH, INITRD_PATH, ACPI];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HvParams {
    #[serde(default)]
    pub kernel_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub initrd_path: Option<PathBuf>,
    #[serde(default = "default_acpi")]
    pub acpi: bool,
}

impl Default for HvParams {
    fn default() -> Self {
        Self {
            kernel_path: None,
            initrd_path: None,
            acpi: default_acpi(),
        }
    }
}

fn default_acpi() -> bool {
    true
}

fn empty_path_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<PathBuf> = Option::deserialize(deserializer)?;
    Ok(value.filter(|path| !path.as_os_str().is_empty()))
}

impl HvParams {
    /// Build parameters from the string mapping orchestrators pass around.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut params = HvParams::default();
        for (key, value) in map {
            match key.as_str() {
                KERNEL_PATH => {
                    params.kernel_path = non_empty(value).map(PathBuf::from);
                }
                INITRD_PATH => {
                    params.initrd_path = non_empty(value).map(PathBuf::from);
                }
                ACPI => {
                    params.acpi = parse_bool(value).ok_or_else(|| {
                        Error::invalid_parameter(format!(
                            "`{ACPI}` must be a boolean (true/false, yes/no, on/off, 1/0), got `{value}`"
                        ))
                    })?;
                }
                other => {
                    return Err(Error::invalid_parameter(format!(
                        "unknown hypervisor parameter `{other}`; supported: {}",
                        PARAMETERS.join(", ")
                    )));
                }
            }
        }
        Ok(params)
    }

    /// Host-independent checks: a kernel is configured and paths are absolute.
    pub fn check_syntax(&self) -> Result<()> {
        let kernel = self
            .kernel_path
            .as_deref()
            .ok_or_else(|| Error::invalid_parameter("a kernel path is required for the instance"))?;

        if !kernel.is_absolute() {
            return Err(Error::invalid_parameter(format!(
                "the kernel path must be an absolute path, got `{}`",
                kernel.display()
            )));
        }

        if let Some(initrd) = &self.initrd_path {
            if !initrd.is_absolute() {
                return Err(Error::invalid_parameter(format!(
                    "the initrd path must be an absolute path if defined, got `{}`",
                    initrd.display()
                )));
            }
        }

        Ok(())
    }

    /// Node-local checks: the kernel (and initrd, if any) exist as regular files.
    pub fn check_runtime(&self) -> Result<()> {
        let kernel = self
            .kernel_path
            .as_deref()
            .ok_or_else(|| Error::invalid_parameter("a kernel path is required for the instance"))?;
        ensure_regular_file("kernel", kernel)?;

        if let Some(initrd) = &self.initrd_path {
            ensure_regular_file("initrd", initrd)?;
        }

        Ok(())
    }
}

fn ensure_regular_file(what: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::invalid_parameter(format!(
            "instance {what} `{}` not found or not a file",
            path.display()
        )))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn params(kernel: Option<&str>, initrd: Option<&str>) -> HvParams {
        HvParams {
            kernel_path: kernel.map(PathBuf::from),
            initrd_path: initrd.map(PathBuf::from),
            acpi: true,
        }
    }

    fn message(err: Error) -> String {
        match err {
            Error::InvalidParameter { message } => message,
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn missing_kernel_fails_syntax() {
        let msg = message(params(None, None).check_syntax().unwrap_err());
        assert!(msg.contains("kernel path is required"));
    }

    #[test]
    fn relative_kernel_fails_syntax_even_if_it_exists() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("vmlinuz"), b"kernel").unwrap();
        // Relative to nothing in particular; existence must not matter.
        let msg = message(params(Some("vmlinuz"), None).check_syntax().unwrap_err());
        assert!(msg.contains("absolute"));
    }

    #[test]
    fn relative_initrd_fails_syntax() {
        let msg = message(
            params(Some("/boot/vmlinuz"), Some("initrd.img"))
                .check_syntax()
                .unwrap_err(),
        );
        assert!(msg.contains("initrd"));
    }

    #[test]
    fn absolute_missing_kernel_passes_syntax_but_fails_runtime() {
        let dir = tempdir().unwrap();
        let kernel = dir.path().join("missing-vmlinuz");
        let params = params(kernel.to_str(), None);
        params.check_syntax().unwrap();
        let msg = message(params.check_runtime().unwrap_err());
        assert!(msg.contains("not found or not a file"));
    }

    #[test]
    fn directory_is_not_a_kernel() {
        let dir = tempdir().unwrap();
        let params = params(dir.path().to_str(), None);
        params.check_syntax().unwrap();
        assert!(params.check_runtime().is_err());
    }

    #[test]
    fn existing_kernel_and_initrd_pass_runtime() {
        let dir = tempdir().unwrap();
        let kernel = dir.path().join("vmlinuz");
        let initrd = dir.path().join("initrd");
        fs::write(&kernel, b"k").unwrap();
        fs::write(&initrd, b"i").unwrap();
        let params = params(kernel.to_str(), initrd.to_str());
        params.check_syntax().unwrap();
        params.check_runtime().unwrap();
    }

    #[test]
    fn missing_initrd_fails_runtime() {
        let dir = tempdir().unwrap();
        let kernel = dir.path().join("vmlinuz");
        fs::write(&kernel, b"k").unwrap();
        let initrd = dir.path().join("initrd");
        let msg = message(
            params(kernel.to_str(), initrd.to_str())
                .check_runtime()
                .unwrap_err(),
        );
        assert!(msg.contains("initrd"));
    }

    #[test]
    fn from_map_parses_known_keys() {
        let map = BTreeMap::from([
            (KERNEL_PATH.to_string(), "/boot/vmlinuz".to_string()),
            (INITRD_PATH.to_string(), "".to_string()),
            (ACPI.to_string(), "no".to_string()),
        ]);
        let params = HvParams::from_map(&map).unwrap();
        assert_eq!(params.kernel_path, Some(PathBuf::from("/boot/vmlinuz")));
        assert_eq!(params.initrd_path, None);
        assert!(!params.acpi);
    }

    #[test]
    fn from_map_rejects_unknown_keys_and_bad_booleans() {
        let unknown = BTreeMap::from([("vnc_bind_address".to_string(), "0.0.0.0".to_string())]);
        assert!(message(HvParams::from_map(&unknown).unwrap_err()).contains("unknown"));

        let bad = BTreeMap::from([(ACPI.to_string(), "maybe".to_string())]);
        assert!(message(HvParams::from_map(&bad).unwrap_err()).contains("boolean"));
    }

    #[test]
    fn deserializes_from_toml_with_defaults() {
        let params: HvParams = toml::from_str("kernel_path = \"/boot/vmlinuz\"\ninitrd_path = \"\"").unwrap();
        assert!(params.acpi);
        assert_eq!(params.initrd_path, None);
    }
}
