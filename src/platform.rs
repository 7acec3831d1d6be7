use std::fmt;

use crate::cmd;

/// Facts about the host that need no optional capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformInfo {
    pub system: String,
    pub release: Option<String>,
    pub version: Option<String>,
    pub machine: Option<String>,
    pub processor: Option<String>,
    pub distribution: Option<String>,
    pub hostname: Option<String>,
    pub is_wsl: bool,
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.system)?;
        for part in [&self.release, &self.version].into_iter().flatten() {
            write!(f, " {}", part)?;
        }
        Ok(())
    }
}

/// Read-only view of the process environment and platform facts.
pub trait Ambient {
    fn platform(&self) -> &PlatformInfo;
    fn var(&self, name: &str) -> Option<String>;
}

#[derive(Debug)]
pub struct HostAmbient {
    info: PlatformInfo,
}

impl HostAmbient {
    pub fn detect() -> Self {
        Self { info: detect() }
    }
}

impl Ambient for HostAmbient {
    fn platform(&self) -> &PlatformInfo {
        &self.info
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Never fails: anything that cannot be determined is left as `None`.
pub fn detect() -> PlatformInfo {
    let system = match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
    .to_string();

    let hostname = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .filter(|h| !h.is_empty());

    let mut info = PlatformInfo {
        system,
        hostname,
        ..PlatformInfo::default()
    };

    if cfg!(windows) {
        info.version = cmd::run_opt("cmd", &["/C", "ver"]).and_then(|v| parse_windows_ver(&v));
        info.release = info
            .version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .map(|major| major.to_string());
        info.machine = std::env::var("PROCESSOR_ARCHITECTURE").ok();
        info.processor = std::env::var("PROCESSOR_IDENTIFIER").ok();
    } else {
        info.release = cmd::run_opt("uname", &["-r"]);
        info.version = cmd::run_opt("uname", &["-v"]);
        info.machine = cmd::run_opt("uname", &["-m"]);
        info.processor = cmd::run_opt("uname", &["-p"]).filter(|p| p != "unknown");
    }

    info.distribution = match std::env::consts::OS {
        "linux" => std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| parse_os_release_field(&content, "PRETTY_NAME")),
        "macos" => {
            let name = cmd::run_opt("sw_vers", &["-productName"]);
            let version = cmd::run_opt("sw_vers", &["-productVersion"]);
            match (name, version) {
                (Some(n), Some(v)) => Some(format!("{} {}", n, v)),
                (n, v) => n.or(v),
            }
        }
        _ => None,
    };

    info.is_wsl = std::env::consts::OS == "linux" && detect_wsl();
    info
}

fn detect_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| {
            let lower = v.to_lowercase();
            lower.contains("microsoft") || lower.contains("wsl")
        })
        .unwrap_or(false)
}

fn parse_os_release_field(content: &str, field: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|l| l.split_once('='))
        .find(|(key, _)| *key == field)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// `Microsoft Windows [Version 10.0.19045.3803]` → `10.0.19045.3803`
fn parse_windows_ver(output: &str) -> Option<String> {
    let start = output.find("[Version ")? + "[Version ".len();
    let rest = &output[start..];
    let end = rest.find(']')?;
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_release_pretty_name() {
        let content = "NAME=\"Debian GNU/Linux\"\nPRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nVERSION_ID=\"12\"\nHOME_URL=\"https://www.debian.org/?a=b\"\n";
        assert_eq!(
            parse_os_release_field(content, "PRETTY_NAME").as_deref(),
            Some("Debian GNU/Linux 12 (bookworm)")
        );
        assert_eq!(
            parse_os_release_field(content, "HOME_URL").as_deref(),
            Some("https://www.debian.org/?a=b")
        );
        assert_eq!(parse_os_release_field(content, "NAME_ID"), None);
    }

    #[test]
    fn windows_ver_output() {
        let output = "\r\nMicrosoft Windows [Version 10.0.19045.3803]\r\n";
        assert_eq!(parse_windows_ver(output).as_deref(), Some("10.0.19045.3803"));
        assert_eq!(parse_windows_ver("garbage"), None);
    }

    #[test]
    fn display_joins_known_parts() {
        let info = PlatformInfo {
            system: "Linux".into(),
            release: Some("6.1.0-18-amd64".into()),
            version: None,
            ..PlatformInfo::default()
        };
        assert_eq!(info.to_string(), "Linux 6.1.0-18-amd64");
    }
}
