//! Plaintext the relay broadcasts.
//!
//! Endpoints see exactly these strings after decryption.

/// Notice sent when a connection introduces itself.
pub fn joined(name: &str) -> String {
    format!("({name} entered...)")
}

/// Notice sent when an introduced connection goes away.
pub fn left(name: &str) -> String {
    format!("({name} left...)")
}

/// A chat message as other peers see it.
pub fn chat(name: &str, text: &str) -> String {
    format!("[{name}] -> {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_formats() {
        assert_eq!(joined("Alice"), "(Alice entered...)");
        assert_eq!(left("Alice"), "(Alice left...)");
        assert_eq!(chat("Alice", "hi"), "[Alice] -> hi");
    }

    #[test]
    fn chat_text_is_not_escaped() {
        assert_eq!(chat("A", "[B] -> x"), "[A] -> [B] -> x");
    }
}
