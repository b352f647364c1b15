use std::collections::VecDeque;

/// Bounded FIFO log of human readable status lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusFeed {
    cap: usize,
    messages: VecDeque<String>,
}

impl StatusFeed {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            messages: VecDeque::with_capacity(cap),
        }
    }

    /// Rebuilds a feed from persisted lines, keeping the newest `cap`.
    pub fn from_messages(cap: usize, messages: Vec<String>) -> Self {
        let mut feed = Self::new(cap);
        for message in messages {
            feed.push(message);
        }
        feed
    }

    /// Appends a line and returns the evicted oldest one, if any.
    pub fn push(&mut self, message: impl Into<String>) -> Option<String> {
        self.messages.push_back(message.into());
        if self.messages.len() > self.cap {
            self.messages.pop_front()
        } else {
            None
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.messages.iter().cloned().collect()
    }
}

pub fn word_found_line(username: &str, word: &str) -> String {
    format!("{username} found the word {}. Well done!", word.to_uppercase())
}

pub fn new_round_line(word_count: usize) -> String {
    if word_count == 1 {
        "New letters! 1 word to find.".to_string()
    } else {
        format!("New letters! {word_count} words to find.")
    }
}

pub fn reveal_line(words: &[String]) -> String {
    format!("Time's up! The answer was {}.", words.join(" and "))
}

pub fn hint_line(hint: &str) -> String {
    format!("Hint: {hint}")
}

pub fn game_started_line(title: &str) -> String {
    format!("{title} has started. Good luck!")
}

pub fn pool_refreshed_line(word_count: usize) -> String {
    format!("The word list was updated ({word_count} words).")
}

pub fn game_ended_line() -> String {
    "The game has ended. Thanks for playing!".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut feed = StatusFeed::new(3);
        let evicted: Vec<Option<String>> = (1..=5).map(|n| feed.push(format!("m{n}"))).collect();
        assert_eq!(feed.to_vec(), vec!["m3", "m4", "m5"]);
        assert_eq!(evicted[3].as_deref(), Some("m1"));
        assert_eq!(evicted[4].as_deref(), Some("m2"));
        assert_eq!(evicted[..3], [None, None, None]);
    }

    #[test]
    fn never_exceeds_cap() {
        let mut feed = StatusFeed::new(4);
        for n in 0..50 {
            feed.push(n.to_string());
            assert!(feed.len() <= feed.cap());
        }
        assert_eq!(feed.messages().next(), Some("46"));
    }

    #[test]
    fn from_messages_keeps_newest() {
        let feed = StatusFeed::from_messages(2, vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(feed.to_vec(), vec!["b", "c"]);
        assert_eq!(StatusFeed::new(0).cap(), 1);
    }

    #[test]
    fn lines_read_naturally() {
        assert_eq!(word_found_line("alice", "kyle"), "alice found the word KYLE. Well done!");
        assert_eq!(new_round_line(1), "New letters! 1 word to find.");
        assert_eq!(
            reveal_line(&["KYLE".to_string(), "STAN".to_string()]),
            "Time's up! The answer was KYLE and STAN."
        );
    }
}
