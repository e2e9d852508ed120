use crate::schema::TOTALS_ACCOUNT;

/// Matching key for account names: lowercase, punctuation stripped,
/// whitespace collapsed. `"Bank - HSBC (Main)"` and `"bank hsbc main"` match.
pub fn normalize_account_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display form of an account name: trimmed, inner whitespace collapsed,
/// original casing kept.
pub fn clean_account_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rows labelled like a sheet's own total line. They are never imported as
/// accounts since the ledger rebuilds its own totals.
pub fn is_total_label(name: &str) -> bool {
    let key = normalize_account_name(name);
    key == normalize_account_name(TOTALS_ACCOUNT)
        || matches!(
            key.as_str(),
            "total" | "grand total" | "total balance" | "trial balance total"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_account_name() {
        assert_eq!(normalize_account_name("Bank - HSBC (Main)"), "bank hsbc main");
        assert_eq!(normalize_account_name("  Accounts   Payable "), "accounts payable");
        assert_eq!(normalize_account_name("Rent & Rates"), "rent rates");
        assert_eq!(normalize_account_name("---"), "");
    }

    #[test]
    fn test_clean_account_name() {
        assert_eq!(clean_account_name("  Petty\tCash  "), "Petty Cash");
    }

    #[test]
    fn test_is_total_label() {
        assert!(is_total_label("TOTAL"));
        assert!(is_total_label("Grand Total:"));
        assert!(is_total_label("Totals"));
        assert!(!is_total_label("Total Assets Reserve"));
        assert!(!is_total_label("Bank"));
    }
}
