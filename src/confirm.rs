use std::io::{self, BufRead, Write};
use std::path::Path;

use log::warn;

/// Decides whether a file that exceeds the threshold should be normalized
pub trait Confirmation {
    fn confirm(&mut self, path: &Path) -> bool;
}

impl<F: FnMut(&Path) -> bool> Confirmation for F {
    fn confirm(&mut self, path: &Path) -> bool {
        self(path)
    }
}

/// Approves every file
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn confirm(&mut self, _path: &Path) -> bool {
        true
    }
}

/// Asks on stdout and reads a `y`/`yes` answer from stdin. Anything else declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Confirmation for TerminalPrompt {
    fn confirm(&mut self, path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let mut stdout = io::stdout().lock();
        if let Err(e) = write!(stdout, "Normalize {name}? [y/N] ").and_then(|_| stdout.flush()) {
            warn!("Could not write prompt: {e}");
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(e) => {
                warn!("Could not read answer, treating as no: {e}");
                false
            }
        }
    }
}

/// `y` or `yes`, case-insensitive
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_is_affirmative() {
        for answer in ["y", "Y\n", " yes ", "YES\r\n"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["", "\n", "n", "no", "yep", "ye s"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[test]
    fn closures_are_confirmations() {
        let mut asked = Vec::new();
        let mut decide = |path: &Path| {
            asked.push(path.to_path_buf());
            path.extension().is_some_and(|e| e == "mkv")
        };
        assert!(decide.confirm(Path::new("a.mkv")));
        assert!(!decide.confirm(Path::new("b.mp4")));
        assert_eq!(asked.len(), 2);
        assert!(AssumeYes.confirm(Path::new("c.mov")));
    }
}
