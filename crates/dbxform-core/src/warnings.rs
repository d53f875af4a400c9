//! Advisory warnings surfaced to the caller.

/// Collects non-fatal warnings and forwards each one to the `log` facade.
#[derive(Debug, Default)]
pub struct WarningSink {
    messages: Vec<String>,
}

impl WarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.messages.push(message);
    }

    /// Warnings recorded since the last drain.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Removes and returns every recorded warning.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_drains() {
        let mut sink = WarningSink::new();
        sink.warn("first");
        sink.warn(String::from("second"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.take(), vec!["first".to_string(), "second".to_string()]);
        assert!(sink.is_empty());
    }
}
