//! Amounts are stored as integer cents; these helpers render them for humans.

/// Formats cents the way invoices print them: `1 234,50 €`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let euros = abs / 100;
    let rest = abs % 100;

    let digits = euros.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped},{rest:02} €")
}

#[cfg(test)]
mod tests {
    use super::format_cents;

    #[test]
    fn formats_small_amounts() {
        assert_eq!(format_cents(0), "0,00 €");
        assert_eq!(format_cents(5), "0,05 €");
        assert_eq!(format_cents(1999), "19,99 €");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(format_cents(123_450), "1 234,50 €");
        assert_eq!(format_cents(100_000_000), "1 000 000,00 €");
    }

    #[test]
    fn keeps_sign() {
        assert_eq!(format_cents(-2500), "-25,00 €");
    }
}
