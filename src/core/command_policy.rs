/// Lexical screening of shell command lines before they reach `sh -c`.
///
/// The command runs with its cwd in the session directory, so the policy
/// refuses anything that names a location outside it: absolute paths, `~`
/// paths, `..` segments and dot globs that can expand to `..`. Directory
/// changing builtins are refused in command position.
///
/// Screening is lexical. Paths assembled at run time (`printf` output fed to
/// command substitution and the like) are out of its reach; the filesystem
/// jail is what keeps such a command from naming host files.
use std::fmt;

const OPERATORS: &[char] = &[';', '&', '|', '(', ')', '<', '>', '`', '\n'];
/// Characters that end a path-like piece inside one shell word
const PIECE_BREAKS: &[char] = &['$', '=', ':', '{', '}', ',', '%', '#', '@', '"', '\''];
const BANNED_COMMANDS: &[&str] = &["cd", "pushd", "popd", "chroot"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub token: String,
    pub reason: &'static str,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command rejected: {} ({})", self.reason, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    text: String,
    command_position: bool,
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Split a command line into words the way the shell would before
/// expansion: quotes removed, backslash escapes resolved, operators splitting
/// words and starting a new command.
fn tokenize(line: &str) -> Vec<Word> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut command_position = true;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    let mut flush = |current: &mut String, started: &mut bool, command_position: &mut bool| {
        if *started {
            let text = std::mem::take(current);
            let assignment = *command_position && is_assignment(&text);
            words.push(Word {
                text,
                command_position: *command_position,
            });
            *command_position = assignment;
            *started = false;
        }
    };

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    started = true;
                }
                '"' => {
                    quote = Quote::Double;
                    started = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        started = true;
                    }
                }
                c if OPERATORS.contains(&c) => {
                    flush(&mut current, &mut started, &mut command_position);
                    command_position = true;
                }
                c if c.is_whitespace() => {
                    flush(&mut current, &mut started, &mut command_position);
                }
                c => {
                    current.push(c);
                    started = true;
                }
            },
        }
    }
    flush(&mut current, &mut started, &mut command_position);
    words
}

fn check_piece(piece: &str) -> Option<&'static str> {
    if piece.starts_with('/') {
        return Some("absolute path");
    }
    if piece.starts_with('~') {
        return Some("home-relative path");
    }
    for segment in piece.split('/') {
        if segment == ".." {
            return Some("parent directory reference");
        }
        if segment.starts_with('.') && segment.contains(['*', '?', '[']) {
            return Some("glob that can match the parent directory");
        }
    }
    None
}

fn check_word(word: &Word) -> Result<(), PolicyViolation> {
    let violation = |token: &str, reason| PolicyViolation {
        token: token.to_string(),
        reason,
    };

    if word.command_position && BANNED_COMMANDS.contains(&word.text.as_str()) {
        return Err(violation(&word.text, "changing directory is not allowed"));
    }

    // brace expansion can assemble `..` from harmless looking pieces
    let text = &word.text;
    if text.contains('{') && (text.contains(".{") || text.contains("}.") || text.contains(",.") || text.contains(".,")) {
        return Err(violation(text, "brace expansion around dots"));
    }

    let pieces = text
        .split(|c: char| c.is_whitespace() || OPERATORS.contains(&c) || PIECE_BREAKS.contains(&c))
        .filter(|p| !p.is_empty());
    for piece in pieces {
        if let Some(reason) = check_piece(piece) {
            return Err(violation(piece, reason));
        }
    }
    Ok(())
}

/// Screens command lines before they are handed to the shell.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy;

impl CommandPolicy {
    pub fn new() -> Self {
        CommandPolicy
    }

    pub fn screen(&self, command_line: &str) -> Result<(), PolicyViolation> {
        tokenize(command_line).iter().try_for_each(check_word)
    }
}
