use std::path::Path;

use crate::kind::ShellKind;

/// Build the argument vector (everything after the shell executable itself)
/// that runs `command` non-interactively under `shell`.
///
/// With `source_profile` set, shells that support it run the command after
/// best-effort sourcing of the user's login/profile initialization files.
/// The generated scripts swallow sourcing failures so a missing or broken
/// rc file never blocks the command itself.
pub fn shell_args(shell: &Path, command: &str, source_profile: bool) -> Vec<String> {
    match ShellKind::from_path(shell) {
        // Neither has a usable profile-sourcing convention for one-shot
        // POSIX command strings.
        ShellKind::Nu | ShellKind::Fish => vec!["-c".to_string(), command.to_string()],
        ShellKind::Zsh => {
            if !source_profile {
                return vec!["-c".to_string(), command.to_string()];
            }
            let script = format!(
                "[[ -f ~/.zshenv ]] && source ~/.zshenv >/dev/null 2>&1 || true\n\
                 [[ -f \"${{ZDOTDIR:-$HOME}}/.zshrc\" ]] && source \"${{ZDOTDIR:-$HOME}}/.zshrc\" >/dev/null 2>&1 || true\n\
                 {command}"
            );
            vec!["-c".to_string(), "-l".to_string(), script]
        }
        ShellKind::Bash => {
            if !source_profile {
                return vec!["-c".to_string(), command.to_string()];
            }
            let script =
                format!("[[ -f ~/.bashrc ]] && source ~/.bashrc >/dev/null 2>&1 || true\n{command}");
            vec!["-c".to_string(), "-l".to_string(), script]
        }
        ShellKind::Cmd => vec!["/c".to_string(), command.to_string()],
        ShellKind::PowerShell => vec![
            "-NoProfile".to_string(),
            "-Command".to_string(),
            command.to_string(),
        ],
        // Generic POSIX convention: `-l` makes it a login shell, but we do
        // not guess at rc file locations for shells we do not recognize.
        ShellKind::Posix => {
            if !source_profile {
                return vec!["-c".to_string(), command.to_string()];
            }
            vec!["-c".to_string(), "-l".to_string(), command.to_string()]
        }
    }
}
