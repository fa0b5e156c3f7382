/// Checks topic names against the naming rules of a broker.
pub trait TopicValidator {
    /// Returns `true` if `topic` can be used for a durable subscription.
    fn is_valid_topic(&self, topic: &str) -> bool;
}

/// Validates a `.`-separated channel name.
///
/// A valid name is non-empty, contains no whitespace, and has no empty
/// tokens. `*` and `>` are only accepted as whole tokens, and only when
/// `wildcards_allowed` is set; `>` must also be the last token.
#[must_use]
pub fn is_channel_name_valid(name: &str, wildcards_allowed: bool) -> bool {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return false;
    }

    let tokens: Vec<&str> = name.split('.').collect();
    let last = tokens.len() - 1;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return false;
        }

        if token.contains('*') || token.contains('>') {
            if !wildcards_allowed {
                return false;
            }

            match *token {
                "*" => {}
                ">" if index == last => {}
                _ => return false,
            }
        }
    }

    true
}
