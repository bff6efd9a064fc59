use subtle::ConstantTimeEq;

/// Compare a caller-supplied credential against the configured secret.
///
/// Runs in constant time for inputs of equal length. A length mismatch
/// returns early, which only reveals the length of the secret.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided.as_bytes();

    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}
