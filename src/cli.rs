use std::path::Path;

use argh::FromArgs;

use crate::config::{Action, ColorMode};

#[derive(FromArgs, Debug)]
/// maintain a binary package repository index
pub(crate) struct Args {
    /// verify the contents of the database
    #[argh(switch, short = 'V')]
    pub verify: bool,
    /// update the database
    #[argh(switch, short = 'U')]
    pub update: bool,
    /// remove entries
    #[argh(switch, short = 'R')]
    pub remove: bool,
    /// query the database
    #[argh(switch, short = 'Q')]
    pub query: bool,
    /// show long-form package info
    #[argh(switch, short = 'i')]
    pub info: bool,
    /// delete old package files; repeat to also delete rejected ones
    #[argh(switch, short = 'c')]
    pub clean: u8,
    /// also write the files index
    #[argh(switch, short = 'f')]
    pub files: bool,
    /// sign the indexes after writing
    #[argh(switch, short = 's')]
    pub sign: bool,
    /// signing certificate path; gpg://<path> signs through gpg-agent
    #[argh(option, short = 'k')]
    pub key: Option<String>,
    /// colour output: never, always or auto
    #[argh(option, default = "ColorMode::Auto")]
    pub color: ColorMode,
    /// display version
    #[argh(switch, short = 'v')]
    pub version: bool,
    /// path to the repository index, followed by package files or entry
    /// names, depending on the action
    #[argh(positional)]
    pub positional: Vec<String>,
}

impl Args {
    pub(crate) fn db_path(&self) -> Option<String> {
        self.positional.first().cloned()
    }

    pub(crate) fn targets(&self) -> &[String] {
        self.positional.get(1..).unwrap_or(&[])
    }
}

/// Resolve the action for this invocation: the program name primes it
/// (`repo-add`, `repo-remove`), then the last action switch wins.
pub(crate) fn resolve_action(argv: &[String]) -> Option<Action> {
    let mut action = argv
        .first()
        .map(Path::new)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(|name| match name {
            "repo-add" => Some(Action::Update),
            "repo-remove" => Some(Action::Remove),
            _ => None,
        });

    for arg in argv.iter().skip(1) {
        match arg.as_str() {
            "-V" | "--verify" => action = Some(Action::Verify),
            "-U" | "--update" => action = Some(Action::Update),
            "-R" | "--remove" => action = Some(Action::Remove),
            "-Q" | "--query" => action = Some(Action::Query),
            _ => {}
        }
    }

    action
}

#[cfg(test)]
fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_last_action_wins() {
    assert_eq!(
        resolve_action(&argv(&["repoman", "-U", "-Q", "repo.db"])),
        Some(Action::Query)
    );
    assert_eq!(
        resolve_action(&argv(&["repoman", "--query", "--verify"])),
        Some(Action::Verify)
    );
    assert_eq!(resolve_action(&argv(&["repoman", "repo.db"])), None);
}

#[test]
fn test_multicall_names() {
    assert_eq!(
        resolve_action(&argv(&["/usr/bin/repo-add", "repo.db", "a.pkg.tar.gz"])),
        Some(Action::Update)
    );
    assert_eq!(
        resolve_action(&argv(&["repo-remove", "repo.db", "a"])),
        Some(Action::Remove)
    );
    // explicit switches still override the invocation name
    assert_eq!(
        resolve_action(&argv(&["repo-add", "-Q", "repo.db"])),
        Some(Action::Query)
    );
}
