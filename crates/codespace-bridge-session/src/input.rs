//! Keystroke input with named control keys.

/// Control key accepted in `{name}` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Enter,
    Up,
    Down,
    Left,
    Right,
    Backspace,
}

impl ControlKey {
    /// Look up a token name (without braces).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "enter" => Some(Self::Enter),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "backspace" => Some(Self::Backspace),
            _ => None,
        }
    }

    /// Key name understood by `tmux send-keys`.
    #[must_use]
    pub const fn tmux_name(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Backspace => "BSpace",
        }
    }
}

/// One unit of input, sent with one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSegment {
    Literal(String),
    Key(ControlKey),
}

/// Split input into literal text and control keys, in order.
///
/// Only the six `{name}` tokens are keys. Any other `{` is literal text, so
/// an unmatched brace never swallows a key token that follows it.
#[must_use]
pub fn parse_input(input: &str) -> Vec<InputSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match key_at(after) {
            Some((key, len)) => {
                if !literal.is_empty() {
                    segments.push(InputSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(InputSegment::Key(key));
                rest = &after[len..];
            }
            None => {
                warn_unknown_token(after);
                literal.push('{');
                rest = after;
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(InputSegment::Literal(literal));
    }
    segments
}

/// Key named right after a `{`, with the length of `name}`.
fn key_at(after: &str) -> Option<(ControlKey, usize)> {
    let close = after.find('}')?;
    ControlKey::from_token(&after[..close]).map(|key| (key, close + 1))
}

fn warn_unknown_token(after: &str) {
    let Some(close) = after.find('}') else {
        return;
    };
    let token = &after[..close];
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        tracing::warn!(token, "Unknown key token, sending literally");
    }
}
