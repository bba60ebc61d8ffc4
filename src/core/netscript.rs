//! Per-NIC wiring scripts handed to the hypervisor's tap backend.
//!
//! The hypervisor runs the script once, at device attach time, with the tap
//! interface name as `$1`. Scripts live in the system temp directory because the
//! state root is commonly mounted `noexec`.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};

use crate::config::Nic;
use crate::error::{Error, Result};

const SCRIPT_MODE: u32 = 0o755;

/// A generated script on disk. The file is deleted when this value is dropped
/// or explicitly [`removed`](NetScript::remove).
#[derive(Debug)]
pub struct NetScript {
    path: TempPath,
}

impl NetScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the script, reporting failures instead of swallowing them.
    pub fn remove(self) -> io::Result<PathBuf> {
        let path = self.path.to_path_buf();
        self.path.close()?;
        Ok(path)
    }
}

/// Writes wiring scripts for one deployment.
#[derive(Debug, Clone)]
pub struct NetScriptWriter {
    /// Operator-installed script that, when executable, replaces the default wiring.
    vif_override: PathBuf,
    /// Where scripts are created; `None` means the system temp directory.
    script_dir: Option<PathBuf>,
}

impl NetScriptWriter {
    pub fn new(vif_override: impl Into<PathBuf>, script_dir: Option<PathBuf>) -> Self {
        Self {
            vif_override: vif_override.into(),
            script_dir,
        }
    }

    pub fn write_script(&self, instance: &str, nic_index: usize, nic: &Nic) -> Result<NetScript> {
        let wrap = |source: io::Error| Error::NetScriptFailed {
            instance: instance.to_string(),
            nic: nic_index,
            source,
        };

        let prefix = format!("kvmhv-{instance}-nic{nic_index}-");
        let mut builder = Builder::new();
        builder.prefix(&prefix).suffix(".sh");
        let mut file = match &self.script_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(wrap)?;

        let contents = render_script(instance, nic, &self.vif_override);
        file.write_all(contents.as_bytes()).map_err(wrap)?;
        file.as_file().sync_all().map_err(wrap)?;

        // Close the write handle before anything executes the file (ETXTBSY).
        let path = file.into_temp_path();
        fs::set_permissions(&path, fs::Permissions::from_mode(SCRIPT_MODE)).map_err(wrap)?;

        Ok(NetScript { path })
    }
}

fn render_script(instance: &str, nic: &Nic, vif_override: &Path) -> String {
    let ip = nic.ip.as_deref().unwrap_or("");
    let vif = shell_quote(&vif_override.to_string_lossy());

    let mut script = String::new();
    script.push_str("#!/bin/sh\n");
    script.push_str("# this is autogenerated by kvmhv, please do not edit\n#\n");
    let _ = writeln!(script, "export INSTANCE={}", shell_quote(instance));
    let _ = writeln!(script, "export MAC={}", shell_quote(&nic.mac));
    let _ = writeln!(script, "export IP={}", shell_quote(ip));
    let _ = writeln!(script, "export BRIDGE={}", shell_quote(&nic.bridge));
    script.push_str("export INTERFACE=\"$1\"\n");
    let _ = writeln!(script, "if [ -x {vif} ]; then");
    script.push_str("  # Site policy owns the wiring\n");
    let _ = writeln!(script, "  exec {vif} \"$@\"");
    script.push_str("else\n");
    script.push_str("  # Attach the tap device to the bridge, no address of its own\n");
    script.push_str("  ip -4 addr flush dev \"$INTERFACE\" || exit 1\n");
    script.push_str("  ip link set \"$INTERFACE\" up || exit 1\n");
    script.push_str("  ip link set \"$INTERFACE\" master \"$BRIDGE\" || exit 1\n");
    script.push_str("fi\n");
    script
}

/// Single-quote `value` for `/bin/sh`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::process::Command;
    use tempfile::tempdir;

    fn nic() -> Nic {
        Nic {
            mac: "aa:00:00:11:22:33".into(),
            ip: Some("192.0.2.10".into()),
            bridge: "xen-br0".into(),
        }
    }

    #[test]
    fn script_is_executable_and_outside_state_root() {
        let dir = tempdir().unwrap();
        let writer = NetScriptWriter::new("/nonexistent/vif", Some(dir.path().to_path_buf()));
        let script = writer.write_script("web1", 0, &nic()).unwrap();

        let mode = fs::metadata(script.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        let name = script.path().file_name().unwrap().to_str().unwrap();
        let re = Regex::new(r"^kvmhv-web1-nic0-.+\.sh$").unwrap();
        assert!(re.is_match(name), "unexpected script name {name}");

        let path = script.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn dropping_the_handle_deletes_the_file() {
        let dir = tempdir().unwrap();
        let writer = NetScriptWriter::new("/nonexistent/vif", Some(dir.path().to_path_buf()));
        let path = {
            let script = writer.write_script("web1", 1, &nic()).unwrap();
            script.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn script_exports_nic_details_and_falls_back_to_bridge_attach() {
        let rendered = render_script("web1", &nic(), Path::new("/etc/kvmhv/kvm-vif-bridge"));
        assert!(rendered.starts_with("#!/bin/sh\n"));
        assert!(rendered.contains("export INSTANCE='web1'\n"));
        assert!(rendered.contains("export MAC='aa:00:00:11:22:33'\n"));
        assert!(rendered.contains("export IP='192.0.2.10'\n"));
        assert!(rendered.contains("export BRIDGE='xen-br0'\n"));
        assert!(rendered.contains("export INTERFACE=\"$1\"\n"));
        assert!(rendered.contains("if [ -x '/etc/kvmhv/kvm-vif-bridge' ]; then"));
        assert!(rendered.contains("ip link set \"$INTERFACE\" master \"$BRIDGE\""));
    }

    #[test]
    fn missing_ip_exports_empty_value() {
        let mut nic = nic();
        nic.ip = None;
        let rendered = render_script("web1", &nic, Path::new("/x"));
        assert!(rendered.contains("export IP=''\n"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
    }

    #[test]
    fn override_receives_exported_environment() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("env.out");
        let vif = dir.path().join("vif");
        fs::write(
            &vif,
            format!(
                "#!/bin/sh\necho \"$INSTANCE $MAC $IP $BRIDGE $INTERFACE\" > '{}'\n",
                out.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&vif, fs::Permissions::from_mode(0o755)).unwrap();

        let writer = NetScriptWriter::new(&vif, Some(dir.path().to_path_buf()));
        let script = writer.write_script("web1", 0, &nic()).unwrap();
        let status = Command::new(script.path()).arg("tap7").status().unwrap();
        assert!(status.success());

        let recorded = fs::read_to_string(&out).unwrap();
        assert_eq!(recorded.trim(), "web1 aa:00:00:11:22:33 192.0.2.10 xen-br0 tap7");
    }

    #[test]
    fn unwritable_directory_is_a_netscript_error() {
        let writer = NetScriptWriter::new("/x", Some(PathBuf::from("/nonexistent/kvmhv-scripts")));
        match writer.write_script("web1", 2, &nic()) {
            Err(Error::NetScriptFailed { instance, nic, .. }) => {
                assert_eq!(instance, "web1");
                assert_eq!(nic, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
