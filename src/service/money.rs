use bigdecimal::BigDecimal;

/// Round to cents, always carrying two decimal places.
pub fn round_money(v: &BigDecimal) -> BigDecimal {
    v.round(2).with_scale(2)
}

/// `amount * percent / 100`, rounded to cents.
pub fn percent_of(amount: &BigDecimal, percent: &BigDecimal) -> BigDecimal {
    round_money(&(amount * percent / BigDecimal::from(100)))
}
