use crate::message::{Message, Role};
use std::fmt;
use tracing::warn;

/// Append-only conversation log plus the running cost of a run.
///
/// One history belongs to one run. Only model capabilities write to it,
/// and a run makes one model call at a time, so the log order is the call
/// order. Because the runner takes `&mut History`, sharing one history
/// between concurrent runs requires the caller to wrap it in a mutex.
///
/// # Examples
///
/// ```
/// use gears::{History, Message};
///
/// let mut history = History::with_system("You are terse.");
/// history.append(Message::user("Hi"));
/// history.increment_cost(0.25);
///
/// assert_eq!(history.len(), 2);
/// assert_eq!(history.cost(), 0.25);
/// ```
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
    cost: f64,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history seeded with one system message.
    pub fn with_system(content: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.append(Message::system(content));
        history
    }

    /// Adds a message to the end of the log.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Adds `amount` to the running cost.
    ///
    /// Negative or non-finite amounts are dropped with a warning; the total
    /// never decreases.
    pub fn increment_cost(&mut self, amount: f64) {
        if !amount.is_finite() || amount < 0.0 {
            warn!(amount, "Ignoring invalid cost increment");
            return;
        }
        self.cost += amount;
    }

    /// Total cost accrued so far.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages with the given role.
    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// Human-readable transcript, one `[Role]: content` line per message.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "History:")?;
        for message in &self.messages {
            let role = match message.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            write!(f, "\n[{}]: {}", role, message.content)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_is_empty() {
        let history = History::new();
        assert!(history.is_empty());
        assert_eq!(history.cost(), 0.0);
    }

    #[test]
    fn test_system_seed() {
        let history = History::with_system("be nice");
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut history = History::new();
        history.append(Message::user("one"));
        history.append(Message::assistant("two"));
        history.append(Message::user("three"));

        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(history.count_role(Role::User), 2);
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("three"));
    }

    #[test]
    fn test_cost_is_additive_and_monotonic() {
        let mut history = History::new();
        history.increment_cost(0.5);
        history.increment_cost(0.25);
        history.increment_cost(-1.0);
        history.increment_cost(f64::NAN);
        history.increment_cost(f64::INFINITY);
        assert_eq!(history.cost(), 0.75);
    }

    #[test]
    fn test_render_transcript() {
        let mut history = History::with_system("sys");
        history.append(Message::user("hello"));
        history.append(Message::assistant("hi there"));
        assert_eq!(
            history.render(),
            "History:\n[System]: sys\n[User]: hello\n[Assistant]: hi there"
        );
    }
}
