pub mod allocation;
pub mod backorder;
pub mod cancellation;
pub mod delivery_issues;
pub mod order_lifecycle;
pub mod stock_ledger;

/// Minimum length, in characters, of operator and courier free text
/// (cancellation reasons, issue notes, resolution notes).
pub const MIN_JUSTIFICATION_LEN: usize = 5;

/// Trims the text and checks it against [`MIN_JUSTIFICATION_LEN`].
pub(crate) fn justification(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (trimmed.chars().count() >= MIN_JUSTIFICATION_LEN).then_some(trimmed)
}
