//! Description helpers

/// Join two descriptions into one readable sentence. No space is inserted
/// when `second` starts with a non-alphanumeric character, so
/// `("Parser", ".parse()")` reads `Parser.parse()`.
pub fn description_concat(first: &str, second: &str) -> String {
    match second.chars().next() {
        Some(c) if !c.is_ascii_alphanumeric() => format!("{first}{second}"),
        _ => format!("{first} {second}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_concat() {
        assert_eq!(description_concat("a stack", "pops"), "a stack pops");
        assert_eq!(description_concat("Stack", "#pop()"), "Stack#pop()");
        assert_eq!(description_concat("Stack", ".len"), "Stack.len");
        assert_eq!(description_concat("Stack", "3 items"), "Stack 3 items");
        assert_eq!(description_concat("Stack", ""), "Stack ");
    }
}
