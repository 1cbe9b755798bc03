//! Interactive `mv -i` prompts

use std::sync::LazyLock;

use buddy_core::prelude::*;
use buddy_core::{MovePrompt, RemotePath};
use regex::Regex;

/// Overwrite confirmation printed by toybox `mv -i`.
static OVERWRITE_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^mv: overwrite (.+) \(y/N\):$").expect("overwrite prompt regex is valid")
});

/// Classify one sanitized chunk of an interactive move session.
///
/// Empty text means there is nothing to answer. Text that is neither empty
/// nor a prompt is the device's error message (`mv: bad 'x': No such file`).
pub fn parse_move_prompt(text: &str) -> Result<MovePrompt> {
    let text = text.trim_end();
    if text.is_empty() {
        return Ok(MovePrompt::Nothing);
    }

    let Some(captures) = OVERWRITE_PROMPT.captures(text) else {
        return Err(Error::command(text));
    };

    let raw = unquote(&captures[1]);
    let path = RemotePath::from_percent_encoded(&RemotePath::new(raw).percent_encoded())
        .ok_or_else(|| Error::parse(format!("cannot rebuild path from prompt: {text:?}")))?;

    Ok(MovePrompt::OverwriteConfirmationRequested(path))
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .filter(|inner| !inner.is_empty())
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_nothing() {
        assert_eq!(parse_move_prompt("").unwrap(), MovePrompt::Nothing);
        assert_eq!(parse_move_prompt("\r\n").unwrap(), MovePrompt::Nothing);
    }

    #[test]
    fn test_overwrite_prompt() {
        assert_eq!(
            parse_move_prompt("mv: overwrite sdcard/x.iso (y/N):").unwrap(),
            MovePrompt::OverwriteConfirmationRequested(RemotePath::new("sdcard/x.iso"))
        );
    }

    #[test]
    fn test_prompt_with_spaces_and_quotes() {
        assert_eq!(
            parse_move_prompt("mv: overwrite '/sdcard/Roms/F-Zero GX (USA).iso' (y/N):").unwrap(),
            MovePrompt::OverwriteConfirmationRequested(RemotePath::new(
                "/sdcard/Roms/F-Zero GX (USA).iso"
            ))
        );
    }

    #[test]
    fn test_prompt_path_with_percent_sign() {
        assert_eq!(
            parse_move_prompt("mv: overwrite /sdcard/100%20done (y/N):").unwrap(),
            MovePrompt::OverwriteConfirmationRequested(RemotePath::new("/sdcard/100%20done"))
        );
    }

    #[test]
    fn test_unrebuildable_path_is_parse_failure() {
        assert!(matches!(
            parse_move_prompt("mv: overwrite a\0b (y/N):"),
            Err(Error::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_other_output_is_command_error() {
        match parse_move_prompt("mv: bad '/sdcard/nope': No such file or directory") {
            Err(Error::CommandError { output }) => assert!(output.contains("No such file")),
            other => panic!("expected CommandError, got {other:?}"),
        }
    }
}
