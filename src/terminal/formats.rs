use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Shell {
    Bash,
    Zsh,
    Tcsh,
    Fish,
    Pwsh,
    PowerShell,
    Cmd,
    Nu,
    Elvish,
    Xonsh,
    #[default]
    Generic,
}

impl Shell {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Tcsh => "tcsh",
            Shell::Fish => "fish",
            Shell::Pwsh => "pwsh",
            Shell::PowerShell => "powershell",
            Shell::Cmd => "cmd",
            Shell::Nu => "nu",
            Shell::Elvish => "elvish",
            Shell::Xonsh => "xonsh",
            Shell::Generic => "shell",
        }
    }

    /// Shells whose line editor cannot deal with title or hyperlink escapes.
    pub fn supports_escapes(&self) -> bool {
        !matches!(self, Shell::Elvish | Shell::Xonsh)
    }
}

impl FromStr for Shell {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bash" => Shell::Bash,
            "zsh" => Shell::Zsh,
            "tcsh" => Shell::Tcsh,
            "fish" => Shell::Fish,
            "pwsh" => Shell::Pwsh,
            "powershell" => Shell::PowerShell,
            "cmd" => Shell::Cmd,
            "nu" => Shell::Nu,
            "elvish" => Shell::Elvish,
            "xonsh" => Shell::Xonsh,
            _ => Shell::Generic,
        })
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell specific escape templates. Templated fields use printf-style `%s` / `%d`
/// placeholders and `%%` for a literal percent sign, see [`fill`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formats {
    pub escape: &'static str,
    pub left: &'static str,
    pub linechange: &'static str,
    pub clear_below: &'static str,
    pub clear_line: &'static str,
    pub title: &'static str,
    pub save_cursor_position: &'static str,
    pub restore_cursor_position: &'static str,
    pub osc99: &'static str,
    pub osc7: &'static str,
    pub osc51: &'static str,
    pub hyperlink_start: &'static str,
    pub hyperlink_center: &'static str,
    pub hyperlink_end: &'static str,
    /// Characters in plain text that would be expanded by the shell.
    pub escape_sequences: &'static [(char, &'static str)],
}

impl Formats {
    pub fn for_shell(shell: Shell) -> Self {
        let mut formats = match shell {
            Shell::Bash => Formats {
                escape: "\\[%s\\]",
                linechange: "\\[\x1b[%d%s\\]",
                left: "\\[\x1b[%dD\\]",
                clear_below: "\\[\x1b[0J\\]",
                clear_line: "\\[\x1b[K\\]",
                save_cursor_position: "\\[\x1b7\\]",
                restore_cursor_position: "\\[\x1b8\\]",
                title: "\\[\x1b]0;%s\x07\\]",
                hyperlink_start: "\\[\x1b]8;;",
                hyperlink_center: "\x1b\\\\\\]",
                hyperlink_end: "\\[\x1b]8;;\x1b\\\\\\]",
                osc99: "\\[\x1b]9;9;%s\x1b\\\\\\]",
                osc7: "\\[\x1b]7;file://%s/%s\x1b\\\\\\]",
                osc51: "\\[\x1b]51;A;%s@%s:%s\x1b\\\\\\]",
                escape_sequences: &[('`', "\\`"), ('\\', "\\\\")],
            },
            Shell::Zsh | Shell::Tcsh => Formats {
                escape: "%%{%s%%}",
                linechange: "%%{\x1b[%d%s%%}",
                left: "%%{\x1b[%dD%%}",
                clear_below: "%{\x1b[0J%}",
                clear_line: "%{\x1b[K%}",
                save_cursor_position: "%{\x1b7%}",
                restore_cursor_position: "%{\x1b8%}",
                title: "%%{\x1b]0;%s\x07%%}",
                hyperlink_start: "%{\x1b]8;;",
                hyperlink_center: "\x1b\\%}",
                hyperlink_end: "%{\x1b]8;;\x1b\\%}",
                osc99: "%%{\x1b]9;9;%s\x1b\\%%}",
                osc7: "%%{\x1b]7;file://%s/%s\x1b\\%%}",
                osc51: "%%{\x1b]51;A%s@%s:%s\x1b\\%%}",
                escape_sequences: &[],
            },
            _ => Formats {
                escape: "%s",
                linechange: "\x1b[%d%s",
                left: "\x1b[%dD",
                clear_below: "\x1b[0J",
                clear_line: "\x1b[K",
                save_cursor_position: "\x1b7",
                restore_cursor_position: "\x1b8",
                title: "\x1b]0;%s\x07",
                hyperlink_start: "\x1b]8;;",
                hyperlink_center: "\x1b\\",
                hyperlink_end: "\x1b]8;;\x1b\\",
                osc99: "\x1b]9;9;%s\x1b\\",
                osc7: "\x1b]7;file://%s/%s\x1b\\",
                osc51: "\x1b]51;A%s@%s:%s\x1b\\",
                escape_sequences: &[],
            },
        };

        if shell == Shell::Zsh {
            formats.escape_sequences = &[('`', "\\`"), ('%', "%%")];
        }

        if !shell.supports_escapes() {
            formats.title = "";
            formats.hyperlink_start = "";
            formats.hyperlink_center = "";
            formats.hyperlink_end = "";
        }

        formats
    }

    pub fn supports_hyperlinks(&self) -> bool {
        !self.hyperlink_start.is_empty()
    }

    pub fn escape_char(&self, c: char) -> Option<&'static str> {
        self.escape_sequences
            .iter()
            .find(|(candidate, _)| *candidate == c)
            .map(|(_, escaped)| *escaped)
    }
}

/// Expand a printf-style template: each `%s` / `%d` takes the next argument,
/// `%%` becomes `%`. Missing arguments expand to nothing.
pub fn fill(template: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') | Some('d') => {
                chars.next();
                if let Some(arg) = args.next() {
                    out.push_str(&arg.to_string());
                }
            }
            _ => out.push('%'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill() {
        assert_eq!(fill("%%{%s%%}", &[&"x"]), "%{x%}");
        assert_eq!(fill("\x1b[%d%s", &[&3, &"B"]), "\x1b[3B");
        assert_eq!(fill("100%", &[]), "100%");
        assert_eq!(fill("%s-%s", &[&"a"]), "a-");
    }

    #[test]
    fn test_shell_from_str() {
        assert_eq!("ZSH".parse::<Shell>().unwrap(), Shell::Zsh);
        assert_eq!("ksh".parse::<Shell>().unwrap(), Shell::Generic);
    }

    #[test]
    fn test_escape_sequences_per_shell() {
        let bash = Formats::for_shell(Shell::Bash);
        assert_eq!(bash.escape_char('\\'), Some("\\\\"));
        assert_eq!(bash.escape_char('%'), None);

        let zsh = Formats::for_shell(Shell::Zsh);
        assert_eq!(zsh.escape_char('%'), Some("%%"));
        assert_eq!(zsh.escape_char('`'), Some("\\`"));

        let fish = Formats::for_shell(Shell::Fish);
        assert_eq!(fish.escape_char('%'), None);
    }

    #[test]
    fn test_elvish_has_no_title_or_hyperlinks() {
        let elvish = Formats::for_shell(Shell::Elvish);
        assert!(!elvish.supports_hyperlinks());
        assert!(elvish.title.is_empty());
        assert!(Formats::for_shell(Shell::Fish).supports_hyperlinks());
    }
}
