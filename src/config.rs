use std::io::IsTerminal;

/// What a single invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Verify,
    Update,
    Remove,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Never,
    Always,
    Auto,
}

impl argh::FromArgValue for ColorMode {
    fn from_arg_value(value: &str) -> Result<Self, String> {
        match value {
            "never" => Ok(ColorMode::Never),
            "always" => Ok(ColorMode::Always),
            "auto" => Ok(ColorMode::Auto),
            _ => Err(format!("invalid argument '{}' for --color", value)),
        }
    }
}

/// Per-invocation configuration, built once from the CLI and threaded
/// through the engine by reference.
pub struct Config {
    pub action: Action,
    /// 1 deletes superseded package files, 2 also deletes rejected
    /// candidates
    pub clean: u8,
    pub info: bool,
    pub sign: bool,
    pub files: bool,
    pub key: Option<String>,
    pub colstr: ColorScheme,
}

/// ANSI fragments for user-facing progress lines.
pub struct ColorScheme {
    colon: &'static str,
    nocolor: &'static str,
}

impl ColorScheme {
    pub fn new(mode: ColorMode) -> Self {
        let enabled = match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        };
        if enabled {
            Self {
                colon: "\x1b[1;34m::\x1b[0m\x1b[1m ",
                nocolor: "\x1b[0m",
            }
        } else {
            Self {
                colon: ":: ",
                nocolor: "",
            }
        }
    }

    /// Progress line with the `:: ` prefix.
    pub fn colon_print(&self, msg: &str) {
        println!("{}{}{}", self.colon, msg, self.nocolor);
    }
}

#[cfg(test)]
impl Config {
    /// Quiet config for scratch repositories in tests.
    pub(crate) fn for_tests(action: Action) -> Self {
        Self {
            action,
            clean: 0,
            info: false,
            sign: false,
            files: false,
            key: None,
            colstr: ColorScheme::new(ColorMode::Never),
        }
    }
}
