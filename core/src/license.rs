//! The licenses the scope knows about and where it keeps them.

use std::fmt;

/// Directory holding the installed license files on the scope.
pub const FIRMDATA_DIR: &str = "/usr/bin/siglent/firmdata0";

/// File holding the installed bandwidth key.
pub const BANDWIDTH_KEY_PATH: &str = "/usr/bin/siglent/firmdata0/bandwidth.txt";

/// License keys are 16 characters; file contents are truncated to this.
pub const KEY_SNIPPET_LEN: usize = 16;

/// Error text `cat` prints for a missing file.
pub const MISSING_FILE_MARKER: &str = "No such file or directory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum License {
    Bandwidth,
    Awg,
    Mso,
    Wifi,
}

impl License {
    /// Feature options installed with `LCISL`, in search order.
    pub const OPTIONS: [License; 3] = [License::Awg, License::Mso, License::Wifi];

    pub fn name(self) -> &'static str {
        match self {
            License::Bandwidth => "MCBD",
            License::Awg => "AWG",
            License::Mso => "MSO",
            License::Wifi => "WIFI",
        }
    }

    /// Path of the file the scope writes once the option is licensed.
    pub fn license_path(self) -> Option<String> {
        match self {
            License::Bandwidth => None,
            other => Some(format!(
                "{}/options_{}_license.txt",
                FIRMDATA_DIR,
                other.name().to_lowercase()
            )),
        }
    }

    /// SCPI command installing `key` for this license.
    pub fn install_command(self, key: &str) -> String {
        match self {
            License::Bandwidth => format!("MCBD {}", key),
            other => format!("LCISL {},{}", other.name(), key),
        }
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First [`KEY_SNIPPET_LEN`] characters of a license file, if it is long enough to hold a key.
pub fn key_snippet(content: &str) -> Option<String> {
    let content = content.trim_start();
    if content.chars().count() < KEY_SNIPPET_LEN {
        return None;
    }
    Some(content.chars().take(KEY_SNIPPET_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_paths_use_lowercase_names() {
        assert_eq!(
            License::Wifi.license_path().as_deref(),
            Some("/usr/bin/siglent/firmdata0/options_wifi_license.txt")
        );
        assert_eq!(License::Bandwidth.license_path(), None);
    }

    #[test]
    fn install_commands() {
        assert_eq!(License::Awg.install_command("ABCD"), "LCISL AWG,ABCD");
        assert_eq!(License::Bandwidth.install_command("ABCD"), "MCBD ABCD");
    }

    #[test]
    fn snippet_needs_sixteen_chars() {
        assert_eq!(key_snippet("0123456789ABCDEFtrailing\n").as_deref(), Some("0123456789ABCDEF"));
        assert_eq!(key_snippet("short"), None);
    }
}
