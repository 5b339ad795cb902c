use std::path::Path;

/// Recognized shell families, classified once from the executable path so
/// that everything downstream dispatches on the variant instead of
/// re-matching strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Nu,
    Cmd,
    PowerShell,
    /// Anything unrecognized; treated as a generic POSIX `sh`-compatible.
    Posix,
}

impl ShellKind {
    /// Classify a shell executable by its base filename, case-insensitively,
    /// ignoring a trailing `.exe` on Windows builds of the same shell.
    pub fn from_path(shell: &Path) -> Self {
        let Some(name) = shell.file_name().and_then(|name| name.to_str()) else {
            return ShellKind::Posix;
        };
        let name = name.to_ascii_lowercase();
        let name = name.strip_suffix(".exe").unwrap_or(&name);
        match name {
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            "nu" => ShellKind::Nu,
            "cmd" => ShellKind::Cmd,
            "powershell" | "pwsh" => ShellKind::PowerShell,
            _ => ShellKind::Posix,
        }
    }

    /// Shells whose default scripting semantics are incompatible with
    /// agent-issued POSIX command strings. These are fine shells, just not
    /// usable as the *default* execution shell.
    pub fn unsuitable_as_default(self) -> bool {
        matches!(self, ShellKind::Fish | ShellKind::Nu)
    }
}
