/// Whether `word` is a leading `KEY=value` shell assignment.
fn is_assignment(word: &str) -> bool {
    let Some((key, _)) = word.split_once('=') else {
        return false;
    };
    key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Tokenize a command segment into words using shlex (POSIX word splitting).
pub fn tokenize(command: &str) -> Vec<String> {
    shlex::split(command).unwrap_or_else(|| {
        // Fallback: simple whitespace splitting if shlex can't parse
        command.split_whitespace().map(String::from).collect()
    })
}

/// Words of a segment with leading `VAR=value` assignments removed.
pub fn command_words(command: &str) -> Vec<String> {
    let mut words = tokenize(command);
    let skip = words.iter().take_while(|w| is_assignment(w)).count();
    words.drain(..skip);
    words
}

/// Extract the first real command word as a basename (`/usr/bin/git` → `git`).
pub fn base_command(command: &str) -> String {
    let words = command_words(command);
    let word = words.first().map(String::as_str).unwrap_or("");
    match word.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        _ => word.to_string(),
    }
}
