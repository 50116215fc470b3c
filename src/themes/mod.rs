use crate::color::Palette;

/// Built-in palettes that can be selected with the `theme` setting. Entries are
/// referenced from color expressions as `p:<name>`, e.g. `p:git` or `p:git-fg`.
pub fn get_theme(name: &str) -> Option<Palette> {
    let entries: &[(&str, &str)] = match name {
        "dark" => DARK,
        "light" => LIGHT,
        "nord" => NORD,
        "tokyo-night" => TOKYO_NIGHT,
        "rose-pine" => ROSE_PINE,
        _ => return None,
    };

    Some(
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    )
}

pub fn theme_names() -> &'static [&'static str] {
    &["dark", "light", "nord", "tokyo-night", "rose-pine"]
}

const DARK: &[(&str, &str)] = &[
    ("path", "#2d3748"),
    ("path-fg", "#e2e8f0"),
    ("git", "#38a169"),
    ("git-fg", "#f7fafc"),
    ("time", "#d69e2e"),
    ("time-fg", "#1a202c"),
    ("command", "#805ad5"),
    ("command-fg", "#f7fafc"),
    ("text", "#3182ce"),
    ("text-fg", "#f7fafc"),
    ("error", "#e53e3e"),
    ("error-fg", "#f7fafc"),
];

const LIGHT: &[(&str, &str)] = &[
    ("path", "#f7fafc"),
    ("path-fg", "#2d3748"),
    ("git", "#c6f6d5"),
    ("git-fg", "#1a202c"),
    ("time", "#faf089"),
    ("time-fg", "#1a202c"),
    ("command", "#d6bcfa"),
    ("command-fg", "#1a202c"),
    ("text", "#bee3f8"),
    ("text-fg", "#1a202c"),
    ("error", "#feb2b2"),
    ("error-fg", "#1a202c"),
];

const NORD: &[(&str, &str)] = &[
    ("path", "#2e3440"),
    ("path-fg", "#d8dee9"),
    ("git", "#5e81ac"),
    ("git-fg", "#eceff4"),
    ("time", "#ebcb8b"),
    ("time-fg", "#2e3440"),
    ("command", "#b48ead"),
    ("command-fg", "#eceff4"),
    ("text", "#81a1c1"),
    ("text-fg", "#eceff4"),
    ("error", "#bf616a"),
    ("error-fg", "#eceff4"),
];

const TOKYO_NIGHT: &[(&str, &str)] = &[
    ("path", "#1a1b26"),
    ("path-fg", "#c0caf5"),
    ("git", "#9ece6a"),
    ("git-fg", "#1a1b26"),
    ("time", "#e0af68"),
    ("time-fg", "#1a1b26"),
    ("command", "#bb9af7"),
    ("command-fg", "#1a1b26"),
    ("text", "#7aa2f7"),
    ("text-fg", "#1a1b26"),
    ("error", "#f7768e"),
    ("error-fg", "#1a1b26"),
];

const ROSE_PINE: &[(&str, &str)] = &[
    ("path", "#191724"),
    ("path-fg", "#e0def4"),
    ("git", "#31748f"),
    ("git-fg", "#e0def4"),
    ("time", "#f6c177"),
    ("time-fg", "#191724"),
    ("command", "#eb6f92"),
    ("command-fg", "#e0def4"),
    ("text", "#c4a7e7"),
    ("text-fg", "#191724"),
    ("error", "#ebbcba"),
    ("error-fg", "#191724"),
];
