//! Automatic recovery from zero-gas broadcasts.
//!
//! Nodes answer a transaction sent with `gas = 0` with
//! `not enough gas to cover minimal cost of the transaction (minimal: N, got: 0)`.
//! The minimum is lifted out of that text and used for one retry.

const PATTERN: &str = "not enough gas to cover minimal cost";

/// Extract the node-reported minimum gas, only for the zero-gas case.
pub fn parse_minimal_gas(message: &str) -> Option<u64> {
    if !message.contains(PATTERN) {
        return None;
    }

    let got = number_after(message, "got:")?;
    if got != 0 {
        return None;
    }
    number_after(message, "minimal:")
}

fn number_after(message: &str, label: &str) -> Option<u64> {
    let start = message.find(label)? + label.len();
    let digits: String = message[start..]
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
