use serde_json::{Map, Value};

/// Ordered key -> value arguments for the training program (`--key value`)
pub type ArgumentSet = Map<String, Value>;

/// Apply overrides on top of the shared arguments
///
/// Overridden keys keep their position in the shared ordering. The shared set is never mutated, so
/// every job's arguments depend only on its own overrides.
pub fn merge(shared: &ArgumentSet, overrides: &ArgumentSet) -> ArgumentSet {
    let mut merged = shared.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Format arguments as a command line
///
/// `true` becomes a bare flag and `false` drops the flag entirely.
pub fn to_cli(args: &ArgumentSet) -> Vec<String> {
    let mut cli = Vec::with_capacity(args.len() * 2);
    for (key, value) in args {
        match value {
            Value::Bool(false) | Value::Null => {}
            Value::Bool(true) => cli.push(format!("--{key}")),
            Value::String(s) => {
                cli.push(format!("--{key}"));
                cli.push(s.clone());
            }
            other => {
                cli.push(format!("--{key}"));
                cli.push(other.to_string());
            }
        }
    }
    cli
}

/// Quote a word for bash, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,%+@".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
