use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for settlement date tokens embedded in file names
    /// - Valid: "20240131"
    /// - Invalid: "2024-01-31", "240131", "2024013"
    pub static ref DATE_TOKEN_REGEX: Regex = Regex::new(r"^\d{8}$").unwrap();

    /// Characters stripped from monetary cells before decimal parsing:
    /// thousands separators, yen marks and any whitespace
    pub static ref AMOUNT_NOISE_REGEX: Regex = Regex::new(r"[,\s¥￥円]").unwrap();
}
